use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account phone number not verified")]
    AccountNotVerified,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Account has expired")]
    AccountExpired,

    #[error("Account locked, retry after {retry_after_secs}s")]
    AccountLocked { retry_after_secs: u64 },

    #[error("Session revoked")]
    SessionRevoked,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Refresh token already used")]
    RefreshTokenReused,

    #[error("Verification code expired")]
    OtpExpired,

    #[error("Invalid verification code")]
    OtpInvalidCode,

    #[error("Phone number already verified")]
    OtpAlreadyVerified,

    #[error("Phone number already registered")]
    PhoneAlreadyRegistered,

    #[error("Record not found")]
    NotFound,

    #[error("Password too weak: {0}")]
    WeakPassword(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// True for bad-input failures, false for valid-input-but-not-allowed
    /// failures. Transport layers map the two classes to different status
    /// semantics.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AuthError::Validation(_) | AuthError::WeakPassword(_)
        )
    }

    /// Stable reason code written to the login attempt ledger.
    pub fn reason_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountNotVerified => "account_not_verified",
            AuthError::AccountInactive => "account_inactive",
            AuthError::AccountExpired => "account_expired",
            AuthError::AccountLocked { .. } => "account_locked",
            AuthError::SessionRevoked => "session_revoked",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenInvalid => "token_invalid",
            AuthError::RefreshTokenReused => "refresh_token_reused",
            AuthError::OtpExpired => "otp_expired",
            AuthError::OtpInvalidCode => "otp_invalid_code",
            AuthError::OtpAlreadyVerified => "otp_already_verified",
            AuthError::PhoneAlreadyRegistered => "phone_already_registered",
            AuthError::NotFound => "not_found",
            AuthError::WeakPassword(_) => "weak_password",
            AuthError::Validation(_) => "validation",
            AuthError::Database(_) => "database_error",
            AuthError::Internal(_) => "internal_error",
        }
    }
}

// Conversions from external error types

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        }
    }
}
