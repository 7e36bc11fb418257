//! Database operations for `agents` and `agent_connector_configs`.

use chrono::{DateTime, Utc};
use smartsync_core::AgentStatus;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `agents` table. The key digest is never selected.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentRow {
    pub id: Uuid,
    pub retailer_id: Uuid,
    pub name: String,
    pub status: String,
    pub allowed_write_back: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const AGENT_COLUMNS: &str =
    "id, retailer_id, name, status, allowed_write_back, last_seen_at, created_at";

/// Creates an `OFFLINE` agent and its connector config in one transaction.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either insert fails; nothing is persisted in
/// that case.
pub async fn create_agent(
    pool: &PgPool,
    retailer_id: Uuid,
    name: &str,
    key_hash: &str,
    connector_config: &serde_json::Value,
) -> Result<AgentRow, DbError> {
    let mut tx = pool.begin().await?;

    let agent = sqlx::query_as::<_, AgentRow>(&format!(
        "INSERT INTO agents (id, retailer_id, name, key_hash, status) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {AGENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(retailer_id)
    .bind(name)
    .bind(key_hash)
    .bind(AgentStatus::Offline.as_str())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO agent_connector_configs (agent_id, config) VALUES ($1, $2)")
        .bind(agent.id)
        .bind(connector_config)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(agent)
}

/// Resolves an agent by key digest and records the contact.
///
/// Every authenticated call promotes the agent to `ONLINE` and stamps
/// `last_seen_at`; the lookup and the stamp are one statement.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn authenticate_agent(pool: &PgPool, key_hash: &str) -> Result<Option<AgentRow>, DbError> {
    let row = sqlx::query_as::<_, AgentRow>(&format!(
        "UPDATE agents SET status = $2, last_seen_at = NOW() \
         WHERE key_hash = $1 \
         RETURNING {AGENT_COLUMNS}"
    ))
    .bind(key_hash)
    .bind(AgentStatus::Online.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetches one of the retailer's agents.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the agent does not exist or belongs to
/// another retailer, or [`DbError::Sqlx`] on query failure.
pub async fn get_agent(pool: &PgPool, retailer_id: Uuid, agent_id: Uuid) -> Result<AgentRow, DbError> {
    sqlx::query_as::<_, AgentRow>(&format!(
        "SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1 AND retailer_id = $2"
    ))
    .bind(agent_id)
    .bind(retailer_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Lists the retailer's agents, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_agents(pool: &PgPool, retailer_id: Uuid) -> Result<Vec<AgentRow>, DbError> {
    let rows = sqlx::query_as::<_, AgentRow>(&format!(
        "SELECT {AGENT_COLUMNS} FROM agents WHERE retailer_id = $1 ORDER BY created_at, id"
    ))
    .bind(retailer_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Grants or revokes write-back for an agent.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the agent does not belong to the retailer,
/// or [`DbError::Sqlx`] on update failure.
pub async fn set_agent_write_back(
    pool: &PgPool,
    retailer_id: Uuid,
    agent_id: Uuid,
    allowed: bool,
) -> Result<AgentRow, DbError> {
    sqlx::query_as::<_, AgentRow>(&format!(
        "UPDATE agents SET allowed_write_back = $3 \
         WHERE id = $1 AND retailer_id = $2 \
         RETURNING {AGENT_COLUMNS}"
    ))
    .bind(agent_id)
    .bind(retailer_id)
    .bind(allowed)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the connector configuration created with the agent.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no config exists, or [`DbError::Sqlx`] on
/// query failure.
pub async fn get_connector_config(
    pool: &PgPool,
    agent_id: Uuid,
) -> Result<serde_json::Value, DbError> {
    sqlx::query_scalar::<_, serde_json::Value>(
        "SELECT config FROM agent_connector_configs WHERE agent_id = $1",
    )
    .bind(agent_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
