//! Provenance and audit ledger writes.

use serde_json::json;
use smartsync_db::{insert_sync_batch, NewSyncBatch};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::IngestOutcome;

/// Maximum row errors kept in an audit entry.
pub const MAX_AUDIT_ERRORS: usize = 50;

/// Builds the `details` document stored with an audit entry.
#[must_use]
pub fn audit_details(outcome: &IngestOutcome) -> serde_json::Value {
    let errors: Vec<String> = outcome
        .errors
        .iter()
        .take(MAX_AUDIT_ERRORS)
        .map(ToString::to_string)
        .collect();
    json!({
        "errors": errors,
        "mappingUsed": outcome.mapping_used,
    })
}

/// Appends the audit entry for a completed call.
///
/// Runs after the catalog write. A failure here is logged and swallowed: the
/// catalog change already happened and the caller still gets its outcome.
pub async fn record_audit(
    pool: &PgPool,
    retailer_id: Uuid,
    outcome: &IngestOutcome,
    provenance_hash: String,
) {
    let entry = NewSyncBatch {
        batch_id: outcome.batch_id,
        retailer_id,
        source_type: outcome.source_type,
        records_processed: saturating_i32(outcome.stats.processed),
        records_failed: saturating_i32(outcome.stats.failed),
        status: outcome.status(),
        provenance_hash,
        details: audit_details(outcome),
    };

    if let Err(e) = insert_sync_batch(pool, &entry).await {
        tracing::error!(
            retailer_id = %retailer_id,
            batch_id = %outcome.batch_id,
            error = %e,
            "failed to write audit entry"
        );
    }
}

fn saturating_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
