//! Database operations for `retailers` and `retailer_sessions`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `retailers` table.
#[derive(Clone, sqlx::FromRow)]
pub struct RetailerRow {
    pub id: Uuid,
    pub name: String,
    pub webhook_api_key: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for RetailerRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetailerRow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("webhook_api_key", &"[redacted]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Creates a retailer with a pre-minted webhook key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a key collision).
pub async fn create_retailer(
    pool: &PgPool,
    name: &str,
    webhook_api_key: &str,
) -> Result<RetailerRow, DbError> {
    let row = sqlx::query_as::<_, RetailerRow>(
        "INSERT INTO retailers (id, name, webhook_api_key) VALUES ($1, $2, $3) \
         RETURNING id, name, webhook_api_key, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(webhook_api_key)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Looks up the tenant owning a webhook key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_retailer_by_webhook_key(
    pool: &PgPool,
    webhook_api_key: &str,
) -> Result<Option<RetailerRow>, DbError> {
    let row = sqlx::query_as::<_, RetailerRow>(
        "SELECT id, name, webhook_api_key, created_at FROM retailers WHERE webhook_api_key = $1",
    )
    .bind(webhook_api_key)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Stores a session token digest for a retailer.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_retailer_session(
    pool: &PgPool,
    retailer_id: Uuid,
    token_hash: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO retailer_sessions (retailer_id, token_hash, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(retailer_id)
    .bind(token_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Resolves an unexpired session digest to its retailer.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn resolve_retailer_session(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<Uuid>, DbError> {
    let retailer_id = sqlx::query_scalar::<_, Uuid>(
        "SELECT retailer_id FROM retailer_sessions \
         WHERE token_hash = $1 AND (expires_at IS NULL OR expires_at > NOW())",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(retailer_id)
}
