//! Database operations for the `agent_commands` write-back queue.
//!
//! Lifecycle: `PENDING` → `DELIVERED` (pulled) → `SUCCESS` | `FAILED` (acked).
//! Ack is also accepted straight from `PENDING`.

use chrono::{DateTime, Utc};
use smartsync_core::CommandStatus;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `agent_commands` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentCommandRow {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub command_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub acked_at: Option<DateTime<Utc>>,
}

const COMMAND_COLUMNS: &str =
    "id, agent_id, command_type, payload, status, message, created_at, delivered_at, acked_at";

/// Queues a command for an agent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn enqueue_agent_command(
    pool: &PgPool,
    agent_id: Uuid,
    command_type: &str,
    payload: &serde_json::Value,
) -> Result<AgentCommandRow, DbError> {
    let row = sqlx::query_as::<_, AgentCommandRow>(&format!(
        "INSERT INTO agent_commands (id, agent_id, command_type, payload, status) \
         VALUES ($1, $2, $3, $4, 'PENDING') \
         RETURNING {COMMAND_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(agent_id)
    .bind(command_type)
    .bind(payload)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Hands every `PENDING` command to the agent, oldest first, marking each
/// `DELIVERED` in the same statement.
///
/// `FOR UPDATE SKIP LOCKED` keeps two concurrent pulls from delivering the
/// same command twice.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn pull_pending_commands(
    pool: &PgPool,
    agent_id: Uuid,
) -> Result<Vec<AgentCommandRow>, DbError> {
    let mut rows = sqlx::query_as::<_, AgentCommandRow>(&format!(
        "UPDATE agent_commands SET status = 'DELIVERED', delivered_at = NOW() \
         WHERE id IN ( \
             SELECT id FROM agent_commands \
             WHERE agent_id = $1 AND status = 'PENDING' \
             ORDER BY created_at, id \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING {COMMAND_COLUMNS}"
    ))
    .bind(agent_id)
    .fetch_all(pool)
    .await?;

    // RETURNING order is unspecified.
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(rows)
}

/// Finalizes a `PENDING` or `DELIVERED` command owned by the agent.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the command is unknown, owned by another
/// agent, or already finalized; [`DbError::Sqlx`] on update failure.
pub async fn ack_agent_command(
    pool: &PgPool,
    agent_id: Uuid,
    command_id: Uuid,
    status: CommandStatus,
    message: Option<&str>,
) -> Result<AgentCommandRow, DbError> {
    sqlx::query_as::<_, AgentCommandRow>(&format!(
        "UPDATE agent_commands SET status = $3, message = $4, acked_at = NOW() \
         WHERE id = $1 AND agent_id = $2 AND status IN ('PENDING', 'DELIVERED') \
         RETURNING {COMMAND_COLUMNS}"
    ))
    .bind(command_id)
    .bind(agent_id)
    .bind(status.as_str())
    .bind(message)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
