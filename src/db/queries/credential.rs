//! Account credential lookup for the admin credential-get path.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

/// Login handle and encrypted password copy of an active account, or
/// `None` when the account does not exist or is soft-deleted. The inner
/// `Option` is `None` for accounts without a stored copy (e.g. after a
/// manual password change).
pub async fn fetch_login_credential(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Option<(String, Option<String>)>> {
    let row: Option<(String, Option<String>)> = sqlx::query_as(
        "SELECT username, password_enc FROM users WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
