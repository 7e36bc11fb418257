//! Webhook receiver: tenant by `x-api-key`, optional HMAC signature.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::HeaderMap,
    Extension, Json,
};
use smartsync_engine::{run_ingest, verify_signature};
use smartsync_ingest::IngestSource;

use crate::middleware::RequestId;

use super::ingest::{payload_rows, IngestResponse, PayloadBody};
use super::{map_db_error, map_engine_error, rejection_error, ApiError, ApiResponse, AppState};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// POST /api/v1/sync/webhook
///
/// Nothing is parsed or written until the key, and the signature when one
/// is presented, have been accepted.
pub(in crate::api) async fn receive_webhook(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ApiResponse<IngestResponse>>, ApiError> {
    let rid = req_id.0;
    let body = body.map_err(|e| rejection_error(&rid, e.status(), e.body_text()))?;

    let Some(api_key) = header(&headers, "x-api-key") else {
        return Err(ApiError::new(rid, "unauthorized", "missing x-api-key"));
    };
    let retailer = smartsync_db::find_retailer_by_webhook_key(&state.pool, api_key)
        .await
        .map_err(|e| map_db_error(&rid, &e))?
        .ok_or_else(|| ApiError::new(&rid, "unauthorized", "invalid api key"))?;

    if let Some(signature) = header(&headers, "x-signature") {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if let Err(e) = verify_signature(
            api_key,
            &body,
            signature,
            header(&headers, "x-timestamp"),
            now_ms,
            state.replay_window_secs,
        ) {
            tracing::warn!(retailer_id = %retailer.id, reason = %e, "webhook signature rejected");
            return Err(ApiError::new(rid, "unauthorized", e.to_string()));
        }
    }

    let parsed: PayloadBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::new(&rid, "bad_request", format!("invalid JSON body: {e}")))?;
    let rows = payload_rows(&rid, parsed)?;

    let outcome = run_ingest(
        &state.pool,
        &state.settings,
        retailer.id,
        IngestSource::Webhook(rows),
    )
    .await
    .map_err(|e| map_engine_error(&rid, &e))?;

    Ok(Json(ApiResponse::new(rid, IngestResponse::from(outcome))))
}
