//! Session database operations
use crate::error::Result;
use crate::models::Session;
use sqlx::PgExecutor;
use uuid::Uuid;

/// Create a new session row for a login event
pub async fn create(
    ex: impl PgExecutor<'_>,
    account_id: Uuid,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    location_country: Option<&str>,
    location_city: Option<&str>,
) -> Result<Session> {
    let session = sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions (id, account_id, ip_address, user_agent, location_country, location_city)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account_id)
    .bind(ip_address)
    .bind(user_agent)
    .bind(location_country)
    .bind(location_city)
    .fetch_one(ex)
    .await?;

    Ok(session)
}

pub async fn get(ex: impl PgExecutor<'_>, session_id: Uuid) -> Result<Option<Session>> {
    let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
        .bind(session_id)
        .fetch_optional(ex)
        .await?;

    Ok(session)
}

/// Soft-delete a session
pub async fn revoke(ex: impl PgExecutor<'_>, session_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE sessions SET revoked_at = NOW(), updated_at = NOW() WHERE id = $1 AND revoked_at IS NULL",
    )
    .bind(session_id)
    .execute(ex)
    .await?;

    Ok(())
}

pub async fn revoke_all_for_account(ex: impl PgExecutor<'_>, account_id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE sessions SET revoked_at = NOW(), updated_at = NOW() WHERE account_id = $1 AND revoked_at IS NULL",
    )
    .bind(account_id)
    .execute(ex)
    .await?;

    Ok(result.rows_affected())
}

/// Revoke every session of the account except the one just created.
/// Single-session enforcement runs this on registration, login and
/// password reset alike.
pub async fn revoke_all_except(
    ex: impl PgExecutor<'_>,
    account_id: Uuid,
    keep: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE sessions SET revoked_at = NOW(), updated_at = NOW()
        WHERE account_id = $1 AND id <> $2 AND revoked_at IS NULL
        "#,
    )
    .bind(account_id)
    .bind(keep)
    .execute(ex)
    .await?;

    Ok(result.rows_affected())
}

/// List unrevoked sessions for a "your devices" view
pub async fn list_active(ex: impl PgExecutor<'_>, account_id: Uuid) -> Result<Vec<Session>> {
    let sessions = sqlx::query_as::<_, Session>(
        r#"
        SELECT * FROM sessions
        WHERE account_id = $1 AND revoked_at IS NULL
        ORDER BY last_seen_at DESC
        "#,
    )
    .bind(account_id)
    .fetch_all(ex)
    .await?;

    Ok(sessions)
}

/// Update observed network/device metadata. Audit only, does not affect
/// session validity.
pub async fn touch(
    ex: impl PgExecutor<'_>,
    session_id: Uuid,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sessions
        SET ip_address = COALESCE($2, ip_address),
            user_agent = COALESCE($3, user_agent),
            last_seen_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(ip_address)
    .bind(user_agent)
    .execute(ex)
    .await?;

    Ok(())
}
