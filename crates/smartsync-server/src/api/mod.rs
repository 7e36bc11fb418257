mod agent_protocol;
mod agents;
mod history;
mod ingest;
mod webhook;

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        DefaultBodyLimit, Path, State,
    },
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use smartsync_db::DbError;
use smartsync_engine::{EngineError, EngineSettings};
use smartsync_ingest::IngestError;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_agent_key, require_session, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub settings: Arc<EngineSettings>,
    pub replay_window_secs: u64,
}

/// Success envelope. The payload's fields sit at the top level next to `meta`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(flatten)]
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

/// `{status: "OK"}` acknowledgement used by the agent protocol.
#[derive(Debug, Serialize)]
pub(super) struct StatusOk {
    status: &'static str,
}

impl StatusOk {
    pub(super) const OK: Self = Self { status: "OK" };
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(request_id: String, data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "payload_too_large" => StatusCode::PAYLOAD_TOO_LARGE,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(crate) fn map_db_error(request_id: &str, error: &DbError) -> ApiError {
    if matches!(error, DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "resource not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

/// Maps an extractor rejection, keeping oversized bodies distinct.
pub(super) fn rejection_error(req_id: &str, status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(req_id, "payload_too_large", text)
    } else {
        ApiError::new(req_id, "bad_request", text)
    }
}

/// Unwraps a JSON body, turning a malformed one into the error envelope.
pub(super) fn json_body<T>(
    req_id: &str,
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|e| rejection_error(req_id, e.status(), e.body_text()))
}

/// Unwraps a path parameter, turning a malformed one into the error envelope.
pub(super) fn path_param<T>(
    req_id: &str,
    path: Result<Path<T>, PathRejection>,
) -> Result<T, ApiError> {
    path.map(|Path(value)| value)
        .map_err(|e| rejection_error(req_id, e.status(), e.body_text()))
}

/// Single place where engine failures become HTTP error codes.
pub(crate) fn map_engine_error(request_id: &str, error: &EngineError) -> ApiError {
    match error {
        EngineError::Ingest(IngestError::EmptyPayload) => {
            ApiError::new(request_id, "bad_request", "payload is empty")
        }
        EngineError::Ingest(e @ IngestError::PayloadTooLarge { .. }) => {
            ApiError::new(request_id, "payload_too_large", e.to_string())
        }
        EngineError::Ingest(
            e @ (IngestError::Csv(_) | IngestError::Workbook(_) | IngestError::NoWorksheet),
        ) => ApiError::new(request_id, "bad_request", format!("could not decode file: {e}")),
        EngineError::Db(e) => map_db_error(request_id, e),
        EngineError::CommandNotFound => ApiError::new(request_id, "not_found", error.to_string()),
        EngineError::WriteBackNotAllowed => {
            ApiError::new(request_id, "forbidden", error.to_string())
        }
        EngineError::InvalidAckStatus(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        EngineError::Ingest(_) | EngineError::Json(_) | EngineError::Join(_) => {
            tracing::error!(error = %error, "ingest failed");
            ApiError::new(request_id, "internal_error", "internal error")
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-signature"),
            HeaderName::from_static("x-timestamp"),
            HeaderName::from_static("x-agent-key"),
        ])
}

fn session_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/sync/ingest", post(ingest::ingest))
        .route("/api/v1/sync/history", get(history::list_history))
        .route("/api/v1/agents", get(agents::list_agents))
        .route("/api/v1/agents/register", post(agents::register_agent))
        .route(
            "/api/v1/agents/{agent_id}/permissions",
            put(agents::update_permissions),
        )
        .route(
            "/api/v1/agents/{agent_id}/commands",
            post(agents::enqueue_command),
        )
        .layer(axum::middleware::from_fn_with_state(state, require_session))
}

fn agent_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/agent/heartbeat", post(agent_protocol::heartbeat))
        .route(
            "/api/v1/agent/inventory/snapshot",
            post(agent_protocol::push_snapshot),
        )
        .route(
            "/api/v1/agent/inventory/delta",
            post(agent_protocol::push_delta),
        )
        .route("/api/v1/agent/commands", get(agent_protocol::pull_commands))
        .route(
            "/api/v1/agent/commands/ack",
            post(agent_protocol::ack_command),
        )
        .layer(axum::middleware::from_fn_with_state(
            state,
            require_agent_key,
        ))
}

fn protected_router(state: &AppState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/sync/webhook", post(webhook::receive_webhook))
        .merge(session_router(state.clone()))
        .merge(agent_router(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(DefaultBodyLimit::max(state.settings.max_upload_bytes)),
        )
}

pub fn build_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(&state, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match smartsync_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::new(
                req_id.0,
                HealthData {
                    status: "ok",
                    database: "ok",
                },
            )),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::new(
                    req_id.0,
                    HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                )),
            )
        }
    }
}


#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;
