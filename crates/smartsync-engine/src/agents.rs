//! Agent session management: registration, authentication, inventory pushes,
//! and the write-back command queue.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use smartsync_core::{BatchStats, CommandStatus, FieldMapping, SourceType};
use smartsync_db::{
    ack_agent_command, apply_stock_deltas, authenticate_agent, create_agent, enqueue_agent_command,
    get_agent, pull_pending_commands, AgentCommandRow, AgentRow, DbError,
};
use smartsync_ingest::hash::sha256_hex;
use smartsync_ingest::parse::{coerce_decimal, value_to_text};
use smartsync_ingest::{IngestSource, RowError};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::record_audit;
use crate::error::EngineError;
use crate::keys::{hash_secret, mint_agent_key};
use crate::pipeline::run_ingest;
use crate::profile::resolve_profile;
use crate::types::{EngineSettings, IngestOutcome};

/// A freshly registered agent. `agent_key` is never retrievable again.
#[derive(Debug, Clone)]
pub struct RegisteredAgent {
    pub agent: AgentRow,
    pub agent_key: String,
}

/// One line of a delta push. Fields stay loosely typed so a malformed line
/// fails on its own instead of rejecting the whole request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleDelta {
    #[serde(default)]
    pub sku: Value,
    #[serde(default)]
    pub qty_delta: Value,
}

/// Connector configuration stored alongside every new agent.
#[must_use]
pub fn default_connector_config() -> Value {
    json!({
        "pollIntervalSecs": 300,
        "watchPaths": [],
        "vocabulary": "agent",
    })
}

/// Mints a key, stores its digest, and creates an `OFFLINE` agent.
///
/// # Errors
///
/// Returns [`EngineError::Db`] if the agent cannot be stored.
pub async fn register_agent(
    pool: &PgPool,
    settings: &EngineSettings,
    retailer_id: Uuid,
    name: &str,
) -> Result<RegisteredAgent, EngineError> {
    let agent_key = mint_agent_key();
    let key_hash = hash_secret(&settings.api_key_hash_salt, &agent_key);
    let agent = create_agent(
        pool,
        retailer_id,
        name,
        &key_hash,
        &default_connector_config(),
    )
    .await?;

    tracing::info!(
        retailer_id = %retailer_id,
        agent_id = %agent.id,
        "registered agent"
    );

    Ok(RegisteredAgent { agent, agent_key })
}

/// Resolves a presented agent key, marking the agent `ONLINE`.
///
/// # Errors
///
/// Returns [`EngineError::Db`] on storage failure. An unknown key is
/// `Ok(None)`.
pub async fn authenticate(
    pool: &PgPool,
    settings: &EngineSettings,
    agent_key: &str,
) -> Result<Option<AgentRow>, EngineError> {
    let key_hash = hash_secret(&settings.api_key_hash_salt, agent_key);
    Ok(authenticate_agent(pool, &key_hash).await?)
}

/// Full snapshot push in the agent vocabulary, fused like any other batch.
///
/// # Errors
///
/// See [`run_ingest`].
pub async fn push_snapshot(
    pool: &PgPool,
    settings: &EngineSettings,
    agent: &AgentRow,
    products: Vec<Value>,
) -> Result<IngestOutcome, EngineError> {
    run_ingest(
        pool,
        settings,
        agent.retailer_id,
        IngestSource::AgentSnapshot(products),
    )
    .await
}

/// Applies signed stock deltas atomically and audits the call.
///
/// Lines without a SKU, SKUs the catalog does not know, and records under a
/// record-level lock count as failed. When `stock` is a locked field, every
/// line is rejected.
///
/// # Errors
///
/// Returns [`EngineError::Db`] if the profile read or the update fails.
pub async fn push_delta(
    pool: &PgPool,
    settings: &EngineSettings,
    agent: &AgentRow,
    sales: &[SaleDelta],
) -> Result<IngestOutcome, EngineError> {
    let retailer_id = agent.retailer_id;
    let profile = resolve_profile(
        pool,
        retailer_id,
        SourceType::SecureAgent,
        None,
        settings.profile_cas_retries,
    )
    .await?;
    let stock_locked = profile.rules.is_locked("stock");

    let mut errors: Vec<RowError> = Vec::new();
    let mut accepted: Vec<(usize, String, rust_decimal::Decimal)> = Vec::new();

    for (idx, sale) in sales.iter().enumerate() {
        let row = idx + 1;
        match value_to_text(&sale.sku) {
            None => errors.push(RowError {
                row,
                reason: "Missing SKU".to_string(),
            }),
            Some(_) if stock_locked => errors.push(RowError {
                row,
                reason: "stock is locked".to_string(),
            }),
            Some(sku) => accepted.push((row, sku, coerce_decimal(Some(&sale.qty_delta)))),
        }
    }

    let deltas: Vec<(String, rust_decimal::Decimal)> = accepted
        .iter()
        .map(|(_, sku, delta)| (sku.clone(), *delta))
        .collect();
    let applied: HashMap<String, bool> = apply_stock_deltas(pool, retailer_id, &deltas)
        .await?
        .into_iter()
        .map(|o| (o.sku, o.applied))
        .collect();

    let mut processed = 0;
    for (row, sku, _) in accepted {
        match applied.get(&sku) {
            Some(true) => processed += 1,
            Some(false) => errors.push(RowError {
                row,
                reason: format!("Record {sku} is locked"),
            }),
            None => errors.push(RowError {
                row,
                reason: format!("Unknown SKU {sku}"),
            }),
        }
    }
    errors.sort_by_key(|e| e.row);

    let outcome = IngestOutcome {
        batch_id: Uuid::new_v4(),
        source_type: SourceType::SecureAgent,
        stats: BatchStats {
            processed,
            failed: errors.len(),
        },
        mapping_used: FieldMapping {
            sku: Some("sku".to_string()),
            stock: Some("qtyDelta".to_string()),
            price: None,
            name: None,
        },
        errors,
    };

    tracing::info!(
        retailer_id = %retailer_id,
        agent_id = %agent.id,
        batch_id = %outcome.batch_id,
        processed = outcome.stats.processed,
        failed = outcome.stats.failed,
        "applied stock deltas"
    );

    let provenance_hash = sha256_hex(&serde_json::to_vec(sales)?);
    record_audit(pool, retailer_id, &outcome, provenance_hash).await;
    Ok(outcome)
}

/// Queues a write-back command for one of the retailer's agents.
///
/// # Errors
///
/// Returns [`EngineError::Db`] with [`DbError::NotFound`] for a foreign or
/// unknown agent, and [`EngineError::WriteBackNotAllowed`] when the agent
/// lacks write-back permission.
pub async fn enqueue_command(
    pool: &PgPool,
    retailer_id: Uuid,
    agent_id: Uuid,
    command_type: &str,
    payload: &Value,
) -> Result<AgentCommandRow, EngineError> {
    let agent = get_agent(pool, retailer_id, agent_id).await?;
    if !agent.allowed_write_back {
        return Err(EngineError::WriteBackNotAllowed);
    }

    let command = enqueue_agent_command(pool, agent.id, command_type, payload).await?;
    tracing::info!(
        agent_id = %agent.id,
        command_id = %command.id,
        command_type,
        "queued agent command"
    );
    Ok(command)
}

/// Delivers the agent's pending commands, oldest first.
///
/// # Errors
///
/// Returns [`EngineError::Db`] on storage failure.
pub async fn pull_commands(
    pool: &PgPool,
    agent: &AgentRow,
) -> Result<Vec<AgentCommandRow>, EngineError> {
    Ok(pull_pending_commands(pool, agent.id).await?)
}

/// Finalizes a delivered (or still pending) command.
///
/// # Errors
///
/// - [`EngineError::WriteBackNotAllowed`] when the agent lacks permission.
/// - [`EngineError::InvalidAckStatus`] unless `status` is `SUCCESS` or `FAILED`.
/// - [`EngineError::CommandNotFound`] for unknown, foreign, or already
///   finalized commands.
pub async fn ack_command(
    pool: &PgPool,
    agent: &AgentRow,
    command_id: Uuid,
    status: &str,
    message: Option<&str>,
) -> Result<AgentCommandRow, EngineError> {
    if !agent.allowed_write_back {
        return Err(EngineError::WriteBackNotAllowed);
    }

    let status = status
        .parse::<CommandStatus>()
        .ok()
        .filter(|s| s.is_terminal())
        .ok_or_else(|| EngineError::InvalidAckStatus(status.to_string()))?;

    match ack_agent_command(pool, agent.id, command_id, status, message).await {
        Ok(row) => Ok(row),
        Err(DbError::NotFound) => Err(EngineError::CommandNotFound),
        Err(e) => Err(e.into()),
    }
}
