//! Retailer-side agent management: registration, listing, write-back
//! permission, and command enqueue.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartsync_db::AgentRow;
use uuid::Uuid;

use crate::middleware::{RequestId, RetailerSession};

use super::{
    json_body, map_db_error, map_engine_error, path_param, ApiError, ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub(super) struct RegisterAgentRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PermissionsRequest {
    pub allowed_write_back: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct EnqueueCommandRequest {
    pub command_type: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RegisterAgentResponse {
    pub agent_id: Uuid,
    pub agent_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AgentItem {
    pub agent_id: Uuid,
    pub name: String,
    pub status: String,
    pub allowed_write_back: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<AgentRow> for AgentItem {
    fn from(row: AgentRow) -> Self {
        Self {
            agent_id: row.id,
            name: row.name,
            status: row.status,
            allowed_write_back: row.allowed_write_back,
            last_seen_at: row.last_seen_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct AgentList {
    pub agents: Vec<AgentItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct EnqueuedCommand {
    pub command_id: Uuid,
}

/// POST /api/v1/agents/register
pub(super) async fn register_agent(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<RetailerSession>,
    body: Result<Json<RegisterAgentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<RegisterAgentResponse>>), ApiError> {
    let rid = req_id.0;
    let body = json_body(&rid, body)?;
    let name = body.name.trim();
    if name.is_empty() || name.chars().count() > 200 {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "name must be 1-200 characters",
        ));
    }

    let registered =
        smartsync_engine::register_agent(&state.pool, &state.settings, session.retailer_id, name)
            .await
            .map_err(|e| map_engine_error(&rid, &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            rid,
            RegisterAgentResponse {
                agent_id: registered.agent.id,
                agent_key: registered.agent_key,
            },
        )),
    ))
}

/// GET /api/v1/agents
pub(super) async fn list_agents(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<RetailerSession>,
) -> Result<Json<ApiResponse<AgentList>>, ApiError> {
    let rows = smartsync_db::list_agents(&state.pool, session.retailer_id)
        .await
        .map_err(|e| map_db_error(&req_id.0, &e))?;

    Ok(Json(ApiResponse::new(
        req_id.0,
        AgentList {
            agents: rows.into_iter().map(AgentItem::from).collect(),
        },
    )))
}

/// PUT /api/v1/agents/{agent_id}/permissions
pub(super) async fn update_permissions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<RetailerSession>,
    agent_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<PermissionsRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<AgentItem>>, ApiError> {
    let agent_id = path_param(&req_id.0, agent_id)?;
    let body = json_body(&req_id.0, body)?;
    let row = smartsync_db::set_agent_write_back(
        &state.pool,
        session.retailer_id,
        agent_id,
        body.allowed_write_back,
    )
    .await
    .map_err(|e| map_db_error(&req_id.0, &e))?;

    tracing::info!(
        retailer_id = %session.retailer_id,
        agent_id = %agent_id,
        allowed_write_back = body.allowed_write_back,
        "updated agent write-back permission"
    );

    Ok(Json(ApiResponse::new(req_id.0, AgentItem::from(row))))
}

/// POST /api/v1/agents/{agent_id}/commands
pub(super) async fn enqueue_command(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<RetailerSession>,
    agent_id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<EnqueueCommandRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<EnqueuedCommand>>), ApiError> {
    let rid = req_id.0;
    let agent_id = path_param(&rid, agent_id)?;
    let body = json_body(&rid, body)?;
    let command_type = body.command_type.trim();
    if command_type.is_empty() {
        return Err(ApiError::new(
            rid,
            "validation_error",
            "commandType must not be empty",
        ));
    }

    let command = smartsync_engine::enqueue_command(
        &state.pool,
        session.retailer_id,
        agent_id,
        command_type,
        &body.payload,
    )
    .await
    .map_err(|e| map_engine_error(&rid, &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            rid,
            EnqueuedCommand {
                command_id: command.id,
            },
        )),
    ))
}
