//! Session-authenticated ingest: a multipart file upload or a JSON row array.

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartsync_core::{BatchStats, FieldMapping};
use smartsync_engine::{audit::MAX_AUDIT_ERRORS, run_ingest, IngestOutcome};
use smartsync_ingest::IngestSource;
use uuid::Uuid;

use crate::middleware::{RequestId, RetailerSession};

use super::{map_engine_error, rejection_error, ApiError, ApiResponse, AppState};

/// `{payload: [...]}` body shared by ingest and the webhook.
#[derive(Debug, Deserialize)]
pub(in crate::api) struct PayloadBody {
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct IngestResponse {
    pub message: &'static str,
    pub batch_id: Uuid,
    pub stats: BatchStats,
    pub mapping_used: FieldMapping,
    /// First rejected rows, rendered as `Row N: reason`.
    pub errors: Vec<String>,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            message: outcome.message(),
            batch_id: outcome.batch_id,
            stats: outcome.stats,
            errors: outcome
                .errors
                .iter()
                .take(MAX_AUDIT_ERRORS)
                .map(ToString::to_string)
                .collect(),
            mapping_used: outcome.mapping_used,
        }
    }
}

/// Unwraps `payload` into row values, rejecting anything but an array.
pub(in crate::api) fn payload_rows(req_id: &str, body: PayloadBody) -> Result<Vec<Value>, ApiError> {
    match body.payload {
        Value::Array(rows) => Ok(rows),
        _ => Err(ApiError::new(
            req_id,
            "bad_request",
            "payload must be an array",
        )),
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

async fn read_file_field(req_id: &str, mut multipart: Multipart) -> Result<IngestSource, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| rejection_error(req_id, e.status(), e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(ToOwned::to_owned);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| rejection_error(req_id, e.status(), e.body_text()))?;
        return Ok(IngestSource::File {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    Err(ApiError::new(
        req_id,
        "bad_request",
        "multipart body has no `file` field",
    ))
}

/// POST /api/v1/sync/ingest
pub(in crate::api) async fn ingest(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<RetailerSession>,
    req: Request,
) -> Result<Json<ApiResponse<IngestResponse>>, ApiError> {
    let rid = req_id.0;

    let source = if is_multipart(req.headers()) {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| rejection_error(&rid, e.status(), e.body_text()))?;
        read_file_field(&rid, multipart).await?
    } else {
        let Json(body) = Json::<PayloadBody>::from_request(req, &state)
            .await
            .map_err(|e| rejection_error(&rid, e.status(), e.body_text()))?;
        IngestSource::Rows(payload_rows(&rid, body)?)
    };

    let outcome = run_ingest(&state.pool, &state.settings, session.retailer_id, source)
        .await
        .map_err(|e| map_engine_error(&rid, &e))?;

    Ok(Json(ApiResponse::new(rid, IngestResponse::from(outcome))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn payload_must_be_an_array() {
        let err = payload_rows(
            "req-1",
            PayloadBody {
                payload: json!({"sku": "A"}),
            },
        )
        .unwrap_err();
        assert_eq!(err.error.code, "bad_request");

        let rows = payload_rows(
            "req-1",
            PayloadBody {
                payload: json!([{"sku": "A"}, 7]),
            },
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn multipart_detection_reads_content_type() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=x"),
        );
        assert!(is_multipart(&headers));
    }

    #[test]
    fn response_uses_camel_case_shape() {
        let body = serde_json::to_value(IngestResponse {
            message: "Sync completed",
            batch_id: Uuid::nil(),
            stats: BatchStats {
                processed: 1,
                failed: 0,
            },
            mapping_used: FieldMapping::default(),
            errors: Vec::new(),
        })
        .unwrap();
        assert!(body.get("batchId").is_some());
        assert!(body.get("mappingUsed").is_some());
        assert_eq!(body["stats"]["processed"], 1);
    }
}
