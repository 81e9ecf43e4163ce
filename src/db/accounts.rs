//! Account database operations
use crate::error::Result;
use crate::models::{Account, Role};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Create an account for an OTP-verified phone number
pub async fn create(
    ex: impl PgExecutor<'_>,
    phone: &str,
    password_hash: &str,
    role: Role,
) -> Result<Account> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (id, phone, password_hash, role, is_active, phone_verified)
        VALUES ($1, $2, $3, $4, TRUE, TRUE)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(phone)
    .bind(password_hash)
    .bind(role)
    .fetch_one(ex)
    .await?;

    Ok(account)
}

pub async fn find_by_phone(ex: impl PgExecutor<'_>, phone: &str) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE phone = $1")
        .bind(phone)
        .fetch_optional(ex)
        .await?;

    Ok(account)
}

pub async fn find_by_id(ex: impl PgExecutor<'_>, account_id: Uuid) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
        .bind(account_id)
        .fetch_optional(ex)
        .await?;

    Ok(account)
}

/// Point the account at its current session, or clear the pointer.
///
/// Callers run this in the same transaction that creates or revokes the
/// session, so two concurrent logins cannot leave the pointer at a session
/// the other one revoked.
pub async fn set_current_session(
    ex: impl PgExecutor<'_>,
    account_id: Uuid,
    session_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query(
        "UPDATE accounts SET current_session_id = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(account_id)
    .bind(session_id)
    .execute(ex)
    .await?;

    Ok(())
}

pub async fn update_password(
    ex: impl PgExecutor<'_>,
    account_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    sqlx::query("UPDATE accounts SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(account_id)
        .bind(password_hash)
        .execute(ex)
        .await?;

    Ok(())
}

/// Admin-facing active-state toggle
pub async fn set_active(ex: impl PgExecutor<'_>, account_id: Uuid, active: bool) -> Result<()> {
    sqlx::query("UPDATE accounts SET is_active = $2, updated_at = NOW() WHERE id = $1")
        .bind(account_id)
        .bind(active)
        .execute(ex)
        .await?;

    Ok(())
}

/// Admin-facing role change
pub async fn set_role(ex: impl PgExecutor<'_>, account_id: Uuid, role: Role) -> Result<()> {
    sqlx::query("UPDATE accounts SET role = $2, updated_at = NOW() WHERE id = $1")
        .bind(account_id)
        .bind(role)
        .execute(ex)
        .await?;

    Ok(())
}
