//! Login attempt ledger operations. Append-only from this crate's
//! perspective; pruning belongs to external housekeeping.
use crate::error::Result;
use crate::models::LoginAttempt;
use sqlx::PgExecutor;
use uuid::Uuid;

#[allow(clippy::too_many_arguments)]
pub async fn record(
    ex: impl PgExecutor<'_>,
    phone: &str,
    account_id: Option<Uuid>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    success: bool,
    failure_reason: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO login_attempts (id, phone, account_id, ip_address, user_agent, success, failure_reason)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(phone)
    .bind(account_id)
    .bind(ip_address)
    .bind(user_agent)
    .bind(success)
    .bind(failure_reason)
    .execute(ex)
    .await?;

    Ok(())
}

/// Recent attempts for an identifier, newest first (audit view)
pub async fn recent_for_phone(
    ex: impl PgExecutor<'_>,
    phone: &str,
    limit: i64,
) -> Result<Vec<LoginAttempt>> {
    let attempts = sqlx::query_as::<_, LoginAttempt>(
        r#"
        SELECT * FROM login_attempts
        WHERE phone = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(phone)
    .bind(limit)
    .fetch_all(ex)
    .await?;

    Ok(attempts)
}
