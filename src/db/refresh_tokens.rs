//! Refresh token ledger operations
//!
//! The ledger stores a SHA-256 digest per issued refresh token. Rotation is
//! a compare-and-swap on `revoked_at`: two concurrent rotations presenting
//! the same raw token cannot both succeed, the loser observes the hash as
//! already revoked.
use crate::error::{AuthError, Result};
use crate::models::RefreshTokenRecord;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Persist the digest of a freshly issued refresh token
pub async fn persist(
    ex: impl PgExecutor<'_>,
    account_id: Uuid,
    session_id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<RefreshTokenRecord> {
    let record = sqlx::query_as::<_, RefreshTokenRecord>(
        r#"
        INSERT INTO refresh_tokens (id, account_id, session_id, token_hash, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account_id)
    .bind(session_id)
    .bind(token_hash)
    .bind(expires_at)
    .fetch_one(ex)
    .await?;

    Ok(record)
}

/// Rotate a refresh token: revoke the presented digest and mint exactly one
/// replacement scoped to the same session, atomically.
///
/// Failure modes are distinguished so callers can react to likely replay:
/// - digest unknown: `TokenInvalid`
/// - digest revoked while its session is live: `RefreshTokenReused`
/// - digest expired: `TokenExpired`
/// - owning session revoked: `SessionRevoked`
pub async fn rotate(
    pool: &PgPool,
    old_hash: &str,
    new_hash: &str,
    new_expires_at: DateTime<Utc>,
) -> Result<RefreshTokenRecord> {
    let mut tx = pool.begin().await?;

    // Conditional revoke doubles as the atomicity guard: only one caller
    // can flip revoked_at from NULL.
    let old = sqlx::query_as::<_, RefreshTokenRecord>(
        r#"
        UPDATE refresh_tokens SET revoked_at = NOW()
        WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > NOW()
        RETURNING *
        "#,
    )
    .bind(old_hash)
    .fetch_optional(tx.as_mut())
    .await?;

    let old = match old {
        Some(record) => record,
        None => {
            let existing = sqlx::query_as::<_, RefreshTokenRecord>(
                "SELECT * FROM refresh_tokens WHERE token_hash = $1",
            )
            .bind(old_hash)
            .fetch_optional(tx.as_mut())
            .await?;

            return Err(match existing {
                None => AuthError::TokenInvalid,
                Some(record) if record.is_revoked() => {
                    // Revoked under a live session means the token came back
                    // after rotation: likely replay. Revoked under a dead
                    // session is just an ordinary post-logout attempt.
                    let session_live = sqlx::query_scalar::<_, i64>(
                        "SELECT COUNT(*) FROM sessions WHERE id = $1 AND revoked_at IS NULL",
                    )
                    .bind(record.session_id)
                    .fetch_one(tx.as_mut())
                    .await?;

                    if session_live > 0 {
                        AuthError::RefreshTokenReused
                    } else {
                        AuthError::SessionRevoked
                    }
                }
                Some(record) if record.is_expired() => AuthError::TokenExpired,
                // Live and unexpired yet the conditional update missed it:
                // another writer got there between the two statements.
                Some(_) => AuthError::RefreshTokenReused,
            });
        }
    };

    let session_active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sessions WHERE id = $1 AND revoked_at IS NULL",
    )
    .bind(old.session_id)
    .fetch_one(tx.as_mut())
    .await?;

    if session_active == 0 {
        // Keep the presented token revoked even though rotation fails.
        tx.commit().await?;
        return Err(AuthError::SessionRevoked);
    }

    let replacement = sqlx::query_as::<_, RefreshTokenRecord>(
        r#"
        INSERT INTO refresh_tokens (id, account_id, session_id, token_hash, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(old.account_id)
    .bind(old.session_id)
    .bind(new_hash)
    .bind(new_expires_at)
    .fetch_one(tx.as_mut())
    .await?;

    tx.commit().await?;

    Ok(replacement)
}

pub async fn revoke_all_for_account(ex: impl PgExecutor<'_>, account_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = NOW() WHERE account_id = $1 AND revoked_at IS NULL",
    )
    .bind(account_id)
    .execute(ex)
    .await?;

    Ok(result.rows_affected())
}

pub async fn revoke_all_except_session(
    ex: impl PgExecutor<'_>,
    account_id: Uuid,
    keep_session: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE refresh_tokens SET revoked_at = NOW()
        WHERE account_id = $1 AND session_id <> $2 AND revoked_at IS NULL
        "#,
    )
    .bind(account_id)
    .bind(keep_session)
    .execute(ex)
    .await?;

    Ok(result.rows_affected())
}

pub async fn revoke_for_session(ex: impl PgExecutor<'_>, session_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET revoked_at = NOW() WHERE session_id = $1 AND revoked_at IS NULL",
    )
    .bind(session_id)
    .execute(ex)
    .await?;

    Ok(result.rows_affected())
}

/// Delete rows long past expiry or revocation (maintenance operation)
pub async fn delete_expired(pool: &PgPool, retention: Duration) -> Result<u64> {
    let threshold = Utc::now() - retention;

    let result = sqlx::query(
        r#"
        DELETE FROM refresh_tokens
        WHERE expires_at < $1
           OR (revoked_at IS NOT NULL AND revoked_at < $1)
        "#,
    )
    .bind(threshold)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
