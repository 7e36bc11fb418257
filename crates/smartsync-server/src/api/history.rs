use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartsync_db::SyncBatchRow;
use uuid::Uuid;

use crate::middleware::{RequestId, RetailerSession};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct BatchItem {
    pub batch_id: Uuid,
    pub source_type: String,
    pub records_processed: i32,
    pub records_failed: i32,
    pub status: String,
    pub provenance_hash: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<SyncBatchRow> for BatchItem {
    fn from(row: SyncBatchRow) -> Self {
        Self {
            batch_id: row.batch_id,
            source_type: row.source_type,
            records_processed: row.records_processed,
            records_failed: row.records_failed,
            status: row.status,
            provenance_hash: row.provenance_hash,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct HistoryResponse {
    pub batches: Vec<BatchItem>,
}

/// GET /api/v1/sync/history
pub(super) async fn list_history(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<RetailerSession>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<HistoryResponse>>, ApiError> {
    let limit = normalize_limit(params.limit);
    let rows = smartsync_db::list_sync_batches(&state.pool, session.retailer_id, limit)
        .await
        .map_err(|e| map_db_error(&req_id.0, &e))?;

    Ok(Json(ApiResponse::new(
        req_id.0,
        HistoryResponse {
            batches: rows.into_iter().map(BatchItem::from).collect(),
        },
    )))
}
