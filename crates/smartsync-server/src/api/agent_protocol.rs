//! Endpoints called by on-premise agents, authenticated by `x-agent-key`.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartsync_db::AgentCommandRow;
use smartsync_engine::SaleDelta;
use uuid::Uuid;

use crate::middleware::{AuthenticatedAgent, RequestId};

use super::ingest::IngestResponse;
use super::{json_body, map_engine_error, ApiError, ApiResponse, AppState, StatusOk};

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotRequest {
    #[serde(default)]
    pub products: Value,
}

#[derive(Debug, Deserialize)]
pub(super) struct DeltaRequest {
    #[serde(default)]
    pub sales: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AckRequest {
    pub command_id: Uuid,
    pub status: String,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CommandItem {
    pub command_id: Uuid,
    pub command_type: String,
    pub payload: Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<AgentCommandRow> for CommandItem {
    fn from(row: AgentCommandRow) -> Self {
        Self {
            command_id: row.id,
            command_type: row.command_type,
            payload: row.payload,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CommandList {
    pub commands: Vec<CommandItem>,
}

fn array_field(req_id: &str, field: &str, value: Value) -> Result<Vec<Value>, ApiError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(ApiError::new(
            req_id,
            "bad_request",
            format!("{field} must be an array"),
        )),
    }
}

/// POST /api/v1/agent/heartbeat
pub(super) async fn heartbeat(
    Extension(req_id): Extension<RequestId>,
    Extension(AuthenticatedAgent(agent)): Extension<AuthenticatedAgent>,
) -> Json<ApiResponse<StatusOk>> {
    tracing::debug!(agent_id = %agent.id, "agent heartbeat");
    Json(ApiResponse::new(req_id.0, StatusOk::OK))
}

/// POST /api/v1/agent/inventory/snapshot
pub(super) async fn push_snapshot(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(AuthenticatedAgent(agent)): Extension<AuthenticatedAgent>,
    body: Result<Json<SnapshotRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<IngestResponse>>, ApiError> {
    let rid = req_id.0;
    let body = json_body(&rid, body)?;
    let products = array_field(&rid, "products", body.products)?;

    let outcome = smartsync_engine::push_snapshot(&state.pool, &state.settings, &agent, products)
        .await
        .map_err(|e| map_engine_error(&rid, &e))?;

    Ok(Json(ApiResponse::new(rid, IngestResponse::from(outcome))))
}

/// POST /api/v1/agent/inventory/delta
///
/// A line that is not an object becomes an empty delta and fails as
/// missing its SKU.
pub(super) async fn push_delta(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(AuthenticatedAgent(agent)): Extension<AuthenticatedAgent>,
    body: Result<Json<DeltaRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<IngestResponse>>, ApiError> {
    let rid = req_id.0;
    let body = json_body(&rid, body)?;
    let sales: Vec<SaleDelta> = array_field(&rid, "sales", body.sales)?
        .into_iter()
        .map(|line| serde_json::from_value(line).unwrap_or_default())
        .collect();

    let outcome = smartsync_engine::push_delta(&state.pool, &state.settings, &agent, &sales)
        .await
        .map_err(|e| map_engine_error(&rid, &e))?;

    Ok(Json(ApiResponse::new(rid, IngestResponse::from(outcome))))
}

/// GET /api/v1/agent/commands
pub(super) async fn pull_commands(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(AuthenticatedAgent(agent)): Extension<AuthenticatedAgent>,
) -> Result<Json<ApiResponse<CommandList>>, ApiError> {
    let rows = smartsync_engine::pull_commands(&state.pool, &agent)
        .await
        .map_err(|e| map_engine_error(&req_id.0, &e))?;

    Ok(Json(ApiResponse::new(
        req_id.0,
        CommandList {
            commands: rows.into_iter().map(CommandItem::from).collect(),
        },
    )))
}

/// POST /api/v1/agent/commands/ack
pub(super) async fn ack_command(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(AuthenticatedAgent(agent)): Extension<AuthenticatedAgent>,
    body: Result<Json<AckRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<StatusOk>>, ApiError> {
    let body = json_body(&req_id.0, body)?;
    smartsync_engine::ack_command(
        &state.pool,
        &agent,
        body.command_id,
        &body.status,
        body.message.as_deref(),
    )
    .await
    .map_err(|e| map_engine_error(&req_id.0, &e))?;

    Ok(Json(ApiResponse::new(req_id.0, StatusOk::OK)))
}
