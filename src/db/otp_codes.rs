//! One-time code database operations
use crate::error::Result;
use crate::models::OtpCode;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Insert a fresh code for a phone number
pub async fn create(
    ex: impl PgExecutor<'_>,
    phone: &str,
    code: &str,
    expires_at: DateTime<Utc>,
) -> Result<OtpCode> {
    let record = sqlx::query_as::<_, OtpCode>(
        r#"
        INSERT INTO otp_codes (id, phone, code, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(phone)
    .bind(code)
    .bind(expires_at)
    .fetch_one(ex)
    .await?;

    Ok(record)
}

/// Expire all still-live unused codes for a phone, so only the newest code
/// issued afterwards is acceptable. The `used` flag is left alone: it means
/// "successfully verified", not "dead".
pub async fn invalidate_unused(ex: impl PgExecutor<'_>, phone: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE otp_codes SET expires_at = NOW() WHERE phone = $1 AND used = FALSE AND expires_at > NOW()",
    )
    .bind(phone)
    .execute(ex)
    .await?;

    Ok(result.rows_affected())
}

/// Newest unused record for a phone, if any
pub async fn latest_unused(ex: impl PgExecutor<'_>, phone: &str) -> Result<Option<OtpCode>> {
    let record = sqlx::query_as::<_, OtpCode>(
        r#"
        SELECT * FROM otp_codes
        WHERE phone = $1 AND used = FALSE
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(phone)
    .fetch_optional(ex)
    .await?;

    Ok(record)
}

/// Flip a code to used. Conditional on `used = FALSE`, so a replayed code
/// can only win once; returns whether this caller was the winner.
pub async fn mark_used(ex: impl PgExecutor<'_>, code_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE otp_codes SET used = TRUE, used_at = NOW() WHERE id = $1 AND used = FALSE",
    )
    .bind(code_id)
    .execute(ex)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Count a failed verification against a specific code
pub async fn increment_attempts(ex: impl PgExecutor<'_>, code_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE otp_codes SET attempts = attempts + 1 WHERE id = $1")
        .bind(code_id)
        .execute(ex)
        .await?;

    Ok(())
}

/// Whether the phone has ever completed verification. Registration re-checks
/// this server-side, it never trusts a client-supplied flag.
pub async fn has_verified(ex: impl PgExecutor<'_>, phone: &str) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM otp_codes WHERE phone = $1 AND used = TRUE",
    )
    .bind(phone)
    .fetch_one(ex)
    .await?;

    Ok(count > 0)
}

/// Delete long-expired unused codes (maintenance operation). Used rows are
/// kept: they are the proof of verification for phones not yet registered.
pub async fn delete_expired(pool: &PgPool, retention: Duration) -> Result<u64> {
    let threshold = Utc::now() - retention;

    let result =
        sqlx::query("DELETE FROM otp_codes WHERE used = FALSE AND expires_at < $1")
            .bind(threshold)
            .execute(pool)
            .await?;

    Ok(result.rows_affected())
}
