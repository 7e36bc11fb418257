//! Database operations for the `sync_batches` audit ledger.
//!
//! Entries are insert-only.

use chrono::{DateTime, Utc};
use smartsync_core::{BatchStatus, SourceType};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `sync_batches` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncBatchRow {
    pub id: i64,
    pub batch_id: Uuid,
    pub retailer_id: Uuid,
    pub source_type: String,
    pub records_processed: i32,
    pub records_failed: i32,
    pub status: String,
    pub provenance_hash: String,
    /// `{ "errors": [...], "mappingUsed": {...} }`
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Input for [`insert_sync_batch`].
#[derive(Debug, Clone)]
pub struct NewSyncBatch {
    pub batch_id: Uuid,
    pub retailer_id: Uuid,
    pub source_type: SourceType,
    pub records_processed: i32,
    pub records_failed: i32,
    pub status: BatchStatus,
    pub provenance_hash: String,
    pub details: serde_json::Value,
}

const BATCH_COLUMNS: &str = "id, batch_id, retailer_id, source_type, records_processed, \
     records_failed, status, provenance_hash, details, created_at";

/// Appends one audit entry.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_sync_batch(pool: &PgPool, batch: &NewSyncBatch) -> Result<SyncBatchRow, DbError> {
    let row = sqlx::query_as::<_, SyncBatchRow>(&format!(
        "INSERT INTO sync_batches \
             (batch_id, retailer_id, source_type, records_processed, records_failed, \
              status, provenance_hash, details) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {BATCH_COLUMNS}"
    ))
    .bind(batch.batch_id)
    .bind(batch.retailer_id)
    .bind(batch.source_type.as_str())
    .bind(batch.records_processed)
    .bind(batch.records_failed)
    .bind(batch.status.as_str())
    .bind(&batch.provenance_hash)
    .bind(&batch.details)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Lists a retailer's audit entries, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_batches(
    pool: &PgPool,
    retailer_id: Uuid,
    limit: i64,
) -> Result<Vec<SyncBatchRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncBatchRow>(&format!(
        "SELECT {BATCH_COLUMNS} FROM sync_batches \
         WHERE retailer_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(retailer_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
