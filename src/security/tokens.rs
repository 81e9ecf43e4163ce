//! Signed credential issuance and verification
//!
//! Three independently keyed token scopes: access (short-lived, carries the
//! role), refresh (longer-lived, exchanged with rotation), and
//! password-reset (narrow, short-lived). Each token embeds a `token_type`
//! tag, so even a validly signed token of one scope is rejected by the
//! verifiers of the other two. Expiry is enforced by the signature scheme
//! itself; revocation lives in the session/ledger layer.
use crate::config::TokenSettings;
use crate::error::{AuthError, Result};
use crate::models::Role;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TOKEN_TYPE_ACCESS: &str = "access";
const TOKEN_TYPE_REFRESH: &str = "refresh";
const TOKEN_TYPE_PASSWORD_RESET: &str = "password_reset";

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

/// Wire-level claims shared by all three scopes
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    /// Subject (account id as UUID string)
    sub: String,
    /// Issued at (Unix timestamp)
    iat: i64,
    /// Expiration time (Unix timestamp)
    exp: i64,
    /// Scope discriminator: "access", "refresh" or "password_reset"
    token_type: String,
    /// Session id (access and refresh tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sid: Option<String>,
    /// Role (access tokens only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    /// Phone the reset was issued for (password-reset tokens only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

/// Verified access token claims
#[derive(Debug, Clone)]
pub struct AccessClaims {
    pub account_id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
}

/// Verified refresh token claims
#[derive(Debug, Clone)]
pub struct RefreshClaims {
    pub account_id: Uuid,
    pub session_id: Uuid,
}

/// Verified password-reset token claims
#[derive(Debug, Clone)]
pub struct ResetClaims {
    pub account_id: Uuid,
    pub phone: String,
}

/// Freshly issued access/refresh token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

#[derive(Clone)]
struct Scope {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl Scope {
    fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }
}

/// Credential signer holding the three scope keys
#[derive(Clone)]
pub struct TokenSigner {
    access: Scope,
    refresh: Scope,
    reset: Scope,
}

impl TokenSigner {
    pub fn new(settings: &TokenSettings) -> Self {
        Self {
            access: Scope::new(&settings.access_secret, settings.access_ttl_secs),
            refresh: Scope::new(&settings.refresh_secret, settings.refresh_ttl_secs),
            reset: Scope::new(&settings.reset_secret, settings.reset_ttl_secs),
        }
    }

    /// Lifetime of refresh tokens, used by the ledger when persisting a
    /// record for a freshly issued token.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh.ttl
    }

    /// Issue an access/refresh pair for a session
    pub fn issue(&self, account_id: Uuid, session_id: Uuid, role: Role) -> Result<TokenPair> {
        let now = Utc::now();

        let access_token = sign(
            &self.access,
            Claims {
                sub: account_id.to_string(),
                iat: now.timestamp(),
                exp: (now + self.access.ttl).timestamp(),
                token_type: TOKEN_TYPE_ACCESS.to_string(),
                sid: Some(session_id.to_string()),
                role: Some(role),
                phone: None,
            },
        )?;

        let refresh_token = sign(
            &self.refresh,
            Claims {
                sub: account_id.to_string(),
                iat: now.timestamp(),
                exp: (now + self.refresh.ttl).timestamp(),
                token_type: TOKEN_TYPE_REFRESH.to_string(),
                sid: Some(session_id.to_string()),
                role: None,
                phone: None,
            },
        )?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access.ttl.num_seconds(),
        })
    }

    /// Issue a password-reset token scoped to the phone it was requested for
    pub fn issue_password_reset(&self, account_id: Uuid, phone: &str) -> Result<String> {
        let now = Utc::now();
        sign(
            &self.reset,
            Claims {
                sub: account_id.to_string(),
                iat: now.timestamp(),
                exp: (now + self.reset.ttl).timestamp(),
                token_type: TOKEN_TYPE_PASSWORD_RESET.to_string(),
                sid: None,
                role: None,
                phone: Some(phone.to_string()),
            },
        )
    }

    /// Verify an access token: signature, expiry and scope tag
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        let claims = verify(&self.access, token, TOKEN_TYPE_ACCESS)?;
        Ok(AccessClaims {
            account_id: parse_subject(&claims.sub)?,
            session_id: parse_session(claims.sid.as_deref())?,
            role: claims.role.ok_or(AuthError::TokenInvalid)?,
        })
    }

    /// Verify a refresh token: signature, expiry and scope tag
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        let claims = verify(&self.refresh, token, TOKEN_TYPE_REFRESH)?;
        Ok(RefreshClaims {
            account_id: parse_subject(&claims.sub)?,
            session_id: parse_session(claims.sid.as_deref())?,
        })
    }

    /// Verify a password-reset token: signature, expiry and scope tag
    pub fn verify_password_reset(&self, token: &str) -> Result<ResetClaims> {
        let claims = verify(&self.reset, token, TOKEN_TYPE_PASSWORD_RESET)?;
        Ok(ResetClaims {
            account_id: parse_subject(&claims.sub)?,
            phone: claims.phone.ok_or(AuthError::TokenInvalid)?,
        })
    }
}

fn sign(scope: &Scope, claims: Claims) -> Result<String> {
    encode(&Header::new(JWT_ALGORITHM), &claims, &scope.encoding_key)
        .map_err(|e| AuthError::Internal(format!("Failed to sign token: {}", e)))
}

fn verify(scope: &Scope, token: &str, expected_type: &str) -> Result<Claims> {
    let mut validation = Validation::new(JWT_ALGORITHM);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &scope.decoding_key, &validation)?;

    // A validly signed token of a different scope must not pass; the tag
    // check backs up the per-scope secrets.
    if data.claims.token_type != expected_type {
        return Err(AuthError::TokenInvalid);
    }

    Ok(data.claims)
}

fn parse_subject(sub: &str) -> Result<Uuid> {
    Uuid::parse_str(sub).map_err(|_| AuthError::TokenInvalid)
}

fn parse_session(sid: Option<&str>) -> Result<Uuid> {
    sid.and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(AuthError::TokenInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signer() -> TokenSigner {
        TokenSigner::new(&TokenSettings {
            access_secret: "access-secret-for-tests".to_string(),
            refresh_secret: "refresh-secret-for-tests".to_string(),
            reset_secret: "reset-secret-for-tests".to_string(),
            access_ttl_secs: 900,
            refresh_ttl_secs: 60 * 60 * 24 * 30,
            reset_ttl_secs: 600,
        })
    }

    #[test]
    fn access_token_round_trip() {
        let signer = test_signer();
        let account_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let pair = signer
            .issue(account_id, session_id, Role::Instructor)
            .expect("should issue token pair");

        let claims = signer
            .verify_access(&pair.access_token)
            .expect("access token should verify");

        assert_eq!(claims.account_id, account_id);
        assert_eq!(claims.session_id, session_id);
        assert_eq!(claims.role, Role::Instructor);
        assert_eq!(pair.expires_in, 900);
    }

    #[test]
    fn refresh_token_round_trip() {
        let signer = test_signer();
        let account_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let pair = signer
            .issue(account_id, session_id, Role::Student)
            .expect("should issue token pair");

        let claims = signer
            .verify_refresh(&pair.refresh_token)
            .expect("refresh token should verify");

        assert_eq!(claims.account_id, account_id);
        assert_eq!(claims.session_id, session_id);
    }

    #[test]
    fn refresh_token_rejected_as_access() {
        let signer = test_signer();
        let pair = signer
            .issue(Uuid::new_v4(), Uuid::new_v4(), Role::Student)
            .expect("should issue token pair");

        let err = signer.verify_access(&pair.refresh_token).unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[test]
    fn access_token_rejected_as_refresh() {
        let signer = test_signer();
        let pair = signer
            .issue(Uuid::new_v4(), Uuid::new_v4(), Role::Student)
            .expect("should issue token pair");

        let err = signer.verify_refresh(&pair.access_token).unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[test]
    fn reset_token_round_trip_and_scope_isolation() {
        let signer = test_signer();
        let account_id = Uuid::new_v4();

        let token = signer
            .issue_password_reset(account_id, "+15550001234")
            .expect("should issue reset token");

        let claims = signer
            .verify_password_reset(&token)
            .expect("reset token should verify");
        assert_eq!(claims.account_id, account_id);
        assert_eq!(claims.phone, "+15550001234");

        // Reset tokens must be unusable as access or refresh tokens
        assert!(matches!(
            signer.verify_access(&token).unwrap_err(),
            AuthError::TokenInvalid
        ));
        assert!(matches!(
            signer.verify_refresh(&token).unwrap_err(),
            AuthError::TokenInvalid
        ));
    }

    #[test]
    fn wrong_type_tag_rejected_even_with_valid_signature() {
        let signer = test_signer();
        let now = Utc::now();

        // Signed with the access secret but tagged as refresh
        let forged = sign(
            &signer.access,
            Claims {
                sub: Uuid::new_v4().to_string(),
                iat: now.timestamp(),
                exp: (now + Duration::minutes(15)).timestamp(),
                token_type: TOKEN_TYPE_REFRESH.to_string(),
                sid: Some(Uuid::new_v4().to_string()),
                role: None,
                phone: None,
            },
        )
        .expect("should sign");

        assert!(matches!(
            signer.verify_access(&forged).unwrap_err(),
            AuthError::TokenInvalid
        ));
    }

    #[test]
    fn expired_token_reported_as_expired() {
        let signer = test_signer();
        let now = Utc::now();

        let expired = sign(
            &signer.access,
            Claims {
                sub: Uuid::new_v4().to_string(),
                iat: (now - Duration::hours(2)).timestamp(),
                exp: (now - Duration::hours(1)).timestamp(),
                token_type: TOKEN_TYPE_ACCESS.to_string(),
                sid: Some(Uuid::new_v4().to_string()),
                role: Some(Role::Student),
                phone: None,
            },
        )
        .expect("should sign");

        assert!(matches!(
            signer.verify_access(&expired).unwrap_err(),
            AuthError::TokenExpired
        ));
    }

    #[test]
    fn tampered_token_rejected() {
        let signer = test_signer();
        let pair = signer
            .issue(Uuid::new_v4(), Uuid::new_v4(), Role::Student)
            .expect("should issue token pair");

        let tampered = format!("{}x", pair.access_token);
        assert!(matches!(
            signer.verify_access(&tampered).unwrap_err(),
            AuthError::TokenInvalid
        ));
    }
}
