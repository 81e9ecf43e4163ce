//! Request-time gate for protected calls
//!
//! Verifies the bearer credential, then checks the live session state: the
//! token's session must still be the account's current session and must not
//! be revoked. Signature/expiry failures and revocation failures surface as
//! distinct errors so callers can tell "refresh your token" apart from
//! "log in again".
use crate::db;
use crate::error::{AuthError, Result};
use crate::models::Role;
use crate::security::TokenSigner;
use crate::services::RequestMeta;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

/// Identity attached to a request after it passes the gate
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn has_role(&self, required: Role) -> bool {
        self.role.satisfies(required)
    }
}

#[derive(Clone)]
pub struct RequestVerifier {
    pool: PgPool,
    signer: TokenSigner,
}

impl RequestVerifier {
    pub fn new(pool: PgPool, signer: TokenSigner) -> Self {
        Self { pool, signer }
    }

    /// Authenticate a bearer token against signature, account state and
    /// live session state.
    pub async fn authenticate(&self, bearer: &str, meta: &RequestMeta) -> Result<AuthContext> {
        let claims = self.signer.verify_access(bearer)?;

        let account = db::accounts::find_by_id(&self.pool, claims.account_id)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if !account.is_active {
            return Err(AuthError::AccountInactive);
        }
        if account.is_expired() {
            return Err(AuthError::AccountExpired);
        }

        // A later login moves this pointer; tokens from the superseded
        // session die here even before their signature expires.
        if account.current_session_id != Some(claims.session_id) {
            return Err(AuthError::SessionRevoked);
        }

        let session = db::sessions::get(&self.pool, claims.session_id)
            .await?
            .ok_or(AuthError::SessionRevoked)?;
        if session.is_revoked() {
            return Err(AuthError::SessionRevoked);
        }

        // Keep the audit trail current when the caller moved networks or
        // devices. Best effort, a failure must not fail the request.
        let drifted = (meta.ip().is_some() && meta.ip() != session.ip_address.as_deref())
            || (meta.user_agent().is_some()
                && meta.user_agent() != session.user_agent.as_deref());
        if drifted {
            if let Err(err) =
                db::sessions::touch(&self.pool, session.id, meta.ip(), meta.user_agent()).await
            {
                warn!(session_id = %session.id, error = %err, "Failed to update session metadata");
            }
        }

        Ok(AuthContext {
            account_id: claims.account_id,
            session_id: claims.session_id,
            role: claims.role,
        })
    }

    /// Gate for endpoints where identity is optional. A missing, invalid,
    /// expired or revoked credential all degrade to anonymous; only
    /// infrastructure failures propagate.
    pub async fn optional_authenticate(
        &self,
        bearer: Option<&str>,
        meta: &RequestMeta,
    ) -> Result<Option<AuthContext>> {
        let Some(token) = bearer else {
            return Ok(None);
        };

        match self.authenticate(token, meta).await {
            Ok(ctx) => Ok(Some(ctx)),
            // Infrastructure trouble is not an anonymous request
            Err(err @ (AuthError::Database(_) | AuthError::Internal(_))) => Err(err),
            Err(_) => Ok(None),
        }
    }
}
