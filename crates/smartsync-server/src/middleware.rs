use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use smartsync_db::AgentRow;
use smartsync_engine::keys::hash_secret;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{map_db_error, map_engine_error, ApiError, AppState};

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Tenant resolved from a bearer session token.
#[derive(Debug, Clone, Copy)]
pub struct RetailerSession {
    pub retailer_id: Uuid,
}

/// Agent resolved from `x-agent-key`, already marked `ONLINE`.
#[derive(Debug, Clone)]
pub struct AuthenticatedAgent(pub AgentRow);

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter shared by every protected route.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Resolves `Authorization: Bearer <token>` to a [`RetailerSession`].
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let rid = request_id_of(&req);
    let Some(token) = extract_bearer_token(req.headers().get(AUTHORIZATION)) else {
        return ApiError::new(rid, "unauthorized", "missing or invalid bearer token")
            .into_response();
    };
    let digest = hash_secret(&state.settings.api_key_hash_salt, token);

    match smartsync_db::resolve_retailer_session(&state.pool, &digest).await {
        Ok(Some(retailer_id)) => {
            req.extensions_mut().insert(RetailerSession { retailer_id });
            next.run(req).await
        }
        Ok(None) => ApiError::new(rid, "unauthorized", "missing or invalid bearer token")
            .into_response(),
        Err(e) => map_db_error(&rid, &e).into_response(),
    }
}

/// Resolves `x-agent-key` to an [`AuthenticatedAgent`].
pub async fn require_agent_key(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let rid = request_id_of(&req);
    let Some(key) = req
        .headers()
        .get("x-agent-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(ToOwned::to_owned)
    else {
        return ApiError::new(rid, "unauthorized", "missing x-agent-key").into_response();
    };

    match smartsync_engine::authenticate(&state.pool, &state.settings, &key).await {
        Ok(Some(agent)) => {
            req.extensions_mut().insert(AuthenticatedAgent(agent));
            next.run(req).await
        }
        Ok(None) => ApiError::new(rid, "unauthorized", "invalid agent key").into_response(),
        Err(e) => map_engine_error(&rid, &e).into_response(),
    }
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        drop(window);
        return ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
            .into_response();
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_token_accepts_valid_header() {
        let header = HeaderValue::from_static("Bearer sst_abc");
        assert_eq!(extract_bearer_token(Some(&header)), Some("sst_abc"));
    }

    #[test]
    fn extract_bearer_token_rejects_non_bearer_header() {
        let header = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&header)), None);
    }

    #[test]
    fn extract_bearer_token_rejects_blank_token() {
        let header = HeaderValue::from_static("Bearer   ");
        assert_eq!(extract_bearer_token(Some(&header)), None);
        assert_eq!(extract_bearer_token(None), None);
    }
}
