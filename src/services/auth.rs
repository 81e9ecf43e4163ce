//! Auth orchestrator facade
//!
//! The only component that touches more than one of the underlying stores
//! in a single operation. Every login-path failure is written to the
//! attempt ledger before it is surfaced, and the in-process counter is
//! consulted before any database work on register/login.
//!
//! Single-session policy: registration, login and password reset all end in
//! `establish_session`, which revokes every other session and refresh token
//! of the account in the same transaction that creates the new session and
//! moves `current_session_id`.
use crate::db;
use crate::error::{AuthError, Result};
use crate::models::{Account, Role, Session};
use crate::rate_limit::AttemptCounter;
use crate::security::{self, hash_password, verify_password, TokenSigner};
use crate::services::otp::{OtpSendOutcome, OtpService};
use crate::services::RequestMeta;
use crate::validators::{is_valid_e164, mask_phone};
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of a successful register/login/refresh/reset
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub account_id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    signer: TokenSigner,
    attempts: Arc<dyn AttemptCounter>,
    otp: OtpService,
}

impl AuthService {
    pub fn new(
        pool: PgPool,
        signer: TokenSigner,
        attempts: Arc<dyn AttemptCounter>,
        otp: OtpService,
    ) -> Self {
        Self {
            pool,
            signer,
            attempts,
            otp,
        }
    }

    pub fn otp(&self) -> &OtpService {
        &self.otp
    }

    /// Register an account for an OTP-verified phone number.
    ///
    /// The verified precondition is re-checked here against the store; a
    /// client-supplied flag is never trusted.
    pub async fn register(
        &self,
        phone: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<AuthTokens> {
        if !is_valid_e164(phone) {
            return Err(AuthError::Validation(
                "Phone number must be in E.164 format".to_string(),
            ));
        }

        if let Err(err) = self.attempts.check(phone) {
            // The durable log keeps recording while locked
            self.record_attempt(phone, None, meta, &err).await;
            return Err(err);
        }

        if !self.otp.is_phone_verified(phone).await? {
            return Err(self.fail(phone, None, meta, AuthError::AccountNotVerified).await);
        }

        if db::accounts::find_by_phone(&self.pool, phone).await?.is_some() {
            return Err(
                self.fail(phone, None, meta, AuthError::PhoneAlreadyRegistered)
                    .await,
            );
        }

        let password_hash = match hash_password(password) {
            Ok(hash) => hash,
            Err(err) => {
                // Weak password is not abuse, keep the counter untouched
                self.record_attempt(phone, None, meta, &err).await;
                return Err(err);
            }
        };

        // A failure inside the transaction (e.g. a unique-violation race on
        // the phone column) still lands in the attempt ledger.
        let tokens = match self.register_tx(phone, &password_hash, meta).await {
            Ok(tokens) => tokens,
            Err(err) => {
                self.record_attempt(phone, None, meta, &err).await;
                return Err(err);
            }
        };

        self.attempts.clear(phone);
        self.record_success(phone, Some(tokens.account_id), meta).await;

        info!(
            account_id = %tokens.account_id,
            phone = %mask_phone(phone),
            "Account registered"
        );

        Ok(tokens)
    }

    async fn register_tx(
        &self,
        phone: &str,
        password_hash: &str,
        meta: &RequestMeta,
    ) -> Result<AuthTokens> {
        let mut tx = self.pool.begin().await?;
        let account = db::accounts::create(tx.as_mut(), phone, password_hash, Role::Student).await?;
        let tokens = self.establish_session(&mut tx, &account, meta).await?;
        tx.commit().await?;
        Ok(tokens)
    }

    /// Authenticate with phone and password
    pub async fn login(
        &self,
        phone: &str,
        password: &str,
        meta: &RequestMeta,
    ) -> Result<AuthTokens> {
        if !is_valid_e164(phone) {
            return Err(AuthError::Validation(
                "Phone number must be in E.164 format".to_string(),
            ));
        }

        if let Err(err) = self.attempts.check(phone) {
            self.record_attempt(phone, None, meta, &err).await;
            return Err(err);
        }

        let account = match db::accounts::find_by_phone(&self.pool, phone).await? {
            Some(account) => account,
            None => return Err(self.fail(phone, None, meta, AuthError::InvalidCredentials).await),
        };

        if !account.phone_verified {
            return Err(
                self.fail(phone, Some(account.id), meta, AuthError::AccountNotVerified)
                    .await,
            );
        }
        if !account.is_active {
            return Err(
                self.fail(phone, Some(account.id), meta, AuthError::AccountInactive)
                    .await,
            );
        }
        if account.is_expired() {
            return Err(
                self.fail(phone, Some(account.id), meta, AuthError::AccountExpired)
                    .await,
            );
        }

        if !verify_password(password, &account.password_hash)? {
            return Err(
                self.fail(phone, Some(account.id), meta, AuthError::InvalidCredentials)
                    .await,
            );
        }

        let tokens = match self.login_tx(&account, meta).await {
            Ok(tokens) => tokens,
            Err(err) => {
                self.record_attempt(phone, Some(account.id), meta, &err).await;
                return Err(err);
            }
        };

        self.attempts.clear(phone);
        self.record_success(phone, Some(account.id), meta).await;

        info!(
            account_id = %account.id,
            phone = %mask_phone(phone),
            "Login succeeded"
        );

        Ok(tokens)
    }

    async fn login_tx(&self, account: &Account, meta: &RequestMeta) -> Result<AuthTokens> {
        let mut tx = self.pool.begin().await?;
        let tokens = self.establish_session(&mut tx, account, meta).await?;
        tx.commit().await?;
        Ok(tokens)
    }

    /// Exchange a refresh token for a fresh pair, rotating the presented
    /// token. A rotation against an already-revoked digest is surfaced as
    /// `RefreshTokenReused` and logged as likely replay.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens> {
        let claims = self.signer.verify_refresh(refresh_token)?;

        let account = db::accounts::find_by_id(&self.pool, claims.account_id)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if !account.is_active {
            return Err(AuthError::AccountInactive);
        }
        if account.is_expired() {
            return Err(AuthError::AccountExpired);
        }

        // Fresh access token carries the account's current role, so role
        // changes take effect at the next refresh.
        let pair = self
            .signer
            .issue(account.id, claims.session_id, account.role)?;

        let old_hash = security::hash_token(refresh_token);
        let new_hash = security::hash_token(&pair.refresh_token);
        let new_expires_at = Utc::now() + self.signer.refresh_ttl();

        if let Err(err) =
            db::refresh_tokens::rotate(&self.pool, &old_hash, &new_hash, new_expires_at).await
        {
            if matches!(err, AuthError::RefreshTokenReused) {
                warn!(
                    account_id = %account.id,
                    session_id = %claims.session_id,
                    "Refresh token presented after revocation, likely replay"
                );
            }
            return Err(err);
        }

        Ok(AuthTokens {
            account_id: account.id,
            session_id: claims.session_id,
            role: account.role,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        })
    }

    /// Revoke every session and refresh token of the account
    pub async fn logout(&self, account_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        db::sessions::revoke_all_for_account(tx.as_mut(), account_id).await?;
        db::refresh_tokens::revoke_all_for_account(tx.as_mut(), account_id).await?;
        db::accounts::set_current_session(tx.as_mut(), account_id, None).await?;
        tx.commit().await?;

        info!(account_id = %account_id, "Logged out");
        Ok(())
    }

    /// Identical semantics to `logout`; kept distinct in the public
    /// contract to signal intent to callers.
    pub async fn logout_all(&self, account_id: Uuid) -> Result<()> {
        self.logout(account_id).await
    }

    /// Start a password reset: send a one-time code to the account's phone
    pub async fn request_password_reset(&self, phone: &str) -> Result<OtpSendOutcome> {
        if db::accounts::find_by_phone(&self.pool, phone).await?.is_none() {
            return Err(AuthError::NotFound);
        }
        self.otp.send(phone).await
    }

    /// Complete the OTP leg of a reset: verify the code and issue the
    /// narrow reset-scoped token
    pub async fn confirm_password_reset(&self, phone: &str, code: &str) -> Result<String> {
        let account = db::accounts::find_by_phone(&self.pool, phone)
            .await?
            .ok_or(AuthError::NotFound)?;

        self.otp.verify(phone, code).await?;
        self.signer.issue_password_reset(account.id, phone)
    }

    /// Finish a reset: rewrite the password hash, revoke everything the
    /// account had, and treat the reset as a fresh login.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &str,
        meta: &RequestMeta,
    ) -> Result<AuthTokens> {
        let claims = self.signer.verify_password_reset(reset_token)?;

        let account = db::accounts::find_by_id(&self.pool, claims.account_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        // The token was issued for a specific phone; a drifted account
        // invalidates it.
        if account.phone != claims.phone {
            return Err(AuthError::TokenInvalid);
        }
        if !account.is_active {
            return Err(AuthError::AccountInactive);
        }

        let password_hash = hash_password(new_password)?;

        let mut tx = self.pool.begin().await?;
        db::accounts::update_password(tx.as_mut(), account.id, &password_hash).await?;
        let tokens = self.establish_session(&mut tx, &account, meta).await?;
        tx.commit().await?;

        self.attempts.clear(&account.phone);
        self.record_success(&account.phone, Some(account.id), meta).await;

        info!(
            account_id = %account.id,
            phone = %mask_phone(&account.phone),
            "Password reset, sessions rotated"
        );

        Ok(tokens)
    }

    /// Active sessions for a "your devices" view
    pub async fn list_sessions(&self, account_id: Uuid) -> Result<Vec<Session>> {
        db::sessions::list_active(&self.pool, account_id).await
    }

    /// Revoke one session by id, ownership-checked. Clears the account's
    /// current-session pointer if it referenced the revoked session.
    pub async fn revoke_session(&self, account_id: Uuid, session_id: Uuid) -> Result<()> {
        let session = db::sessions::get(&self.pool, session_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        // Not the caller's session: report absence, not existence
        if session.account_id != account_id {
            return Err(AuthError::NotFound);
        }

        let account = db::accounts::find_by_id(&self.pool, account_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        let mut tx = self.pool.begin().await?;
        db::sessions::revoke(tx.as_mut(), session_id).await?;
        db::refresh_tokens::revoke_for_session(tx.as_mut(), session_id).await?;
        if account.current_session_id == Some(session_id) {
            db::accounts::set_current_session(tx.as_mut(), account_id, None).await?;
        }
        tx.commit().await?;

        info!(account_id = %account_id, session_id = %session_id, "Session revoked");
        Ok(())
    }

    /// Create the new session, supersede everything else the account holds,
    /// and issue the token pair. Runs inside the caller's transaction so a
    /// concurrent login cannot interleave between pointer move and
    /// revocation.
    async fn establish_session(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account: &Account,
        meta: &RequestMeta,
    ) -> Result<AuthTokens> {
        let session = db::sessions::create(
            tx.as_mut(),
            account.id,
            meta.ip(),
            meta.user_agent(),
            None,
            None,
        )
        .await?;

        db::sessions::revoke_all_except(tx.as_mut(), account.id, session.id).await?;
        db::refresh_tokens::revoke_all_except_session(tx.as_mut(), account.id, session.id).await?;
        db::accounts::set_current_session(tx.as_mut(), account.id, Some(session.id)).await?;

        let pair = self.signer.issue(account.id, session.id, account.role)?;
        let token_hash = security::hash_token(&pair.refresh_token);
        let expires_at = Utc::now() + self.signer.refresh_ttl();
        db::refresh_tokens::persist(tx.as_mut(), account.id, session.id, &token_hash, expires_at)
            .await?;

        Ok(AuthTokens {
            account_id: account.id,
            session_id: session.id,
            role: account.role,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        })
    }

    /// Count the failure in the fast-path window and append it to the
    /// durable ledger, then hand the error back for propagation.
    async fn fail(
        &self,
        phone: &str,
        account_id: Option<Uuid>,
        meta: &RequestMeta,
        err: AuthError,
    ) -> AuthError {
        self.attempts.record_failure(phone);
        self.record_attempt(phone, account_id, meta, &err).await;
        err
    }

    async fn record_attempt(
        &self,
        phone: &str,
        account_id: Option<Uuid>,
        meta: &RequestMeta,
        err: &AuthError,
    ) {
        if let Err(log_err) = db::login_attempts::record(
            &self.pool,
            phone,
            account_id,
            meta.ip(),
            meta.user_agent(),
            false,
            Some(err.reason_code()),
        )
        .await
        {
            error!(
                phone = %mask_phone(phone),
                error = %log_err,
                "Failed to append to the login attempt ledger"
            );
        }
    }

    async fn record_success(&self, phone: &str, account_id: Option<Uuid>, meta: &RequestMeta) {
        if let Err(log_err) = db::login_attempts::record(
            &self.pool,
            phone,
            account_id,
            meta.ip(),
            meta.user_agent(),
            true,
            None,
        )
        .await
        {
            error!(
                phone = %mask_phone(phone),
                error = %log_err,
                "Failed to append to the login attempt ledger"
            );
        }
    }
}
