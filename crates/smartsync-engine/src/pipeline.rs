//! One ingest call end to end.

use smartsync_core::BatchStats;
use smartsync_db::bulk_upsert_catalog;
use smartsync_ingest::{
    agent_field_mapping, normalize_agent_products, normalize_rows, plan_batch, IngestSource,
    Vocabulary,
};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::record_audit;
use crate::error::EngineError;
use crate::profile::resolve_profile;
use crate::types::{EngineSettings, IngestOutcome};

/// Runs the full ingest pipeline for one call.
///
/// 1. Decode and hash the payload (blocking pool for files).
/// 2. Resolve the sync profile, learning a new mapping for tabular input.
/// 3. Normalize rows into drafts; rows without a SKU are counted as failed.
/// 4. Plan field-level patches under the profile's conflict rules.
/// 5. Write every patch in one bulk statement.
/// 6. Append the audit entry (failures logged, not returned).
///
/// # Errors
///
/// Returns [`EngineError::Ingest`] for undecodable or oversized payloads and
/// [`EngineError::Db`] when the profile or the bulk write fails. Row-level
/// problems never error; they show up in the outcome.
pub async fn run_ingest(
    pool: &PgPool,
    settings: &EngineSettings,
    retailer_id: Uuid,
    source: IngestSource,
) -> Result<IngestOutcome, EngineError> {
    let source_type = source.source_type();
    let limit = settings.max_upload_bytes;
    let batch = tokio::task::spawn_blocking(move || source.prepare(limit)).await??;

    let (mapping_used, rules, normalized) = match batch.vocabulary {
        Vocabulary::Tabular => {
            let headers = batch.headers();
            let profile = resolve_profile(
                pool,
                retailer_id,
                source_type,
                Some(headers.as_slice()),
                settings.profile_cas_retries,
            )
            .await?;
            let normalized = normalize_rows(&batch.rows, &profile.mapping);
            (profile.mapping, profile.rules, normalized)
        }
        Vocabulary::Agent => {
            let profile = resolve_profile(
                pool,
                retailer_id,
                source_type,
                None,
                settings.profile_cas_retries,
            )
            .await?;
            (
                agent_field_mapping(),
                profile.rules,
                normalize_agent_products(&batch.rows),
            )
        }
    };

    let patches = plan_batch(&normalized.drafts, &rules);
    bulk_upsert_catalog(pool, retailer_id, &patches).await?;

    let outcome = IngestOutcome {
        batch_id: Uuid::new_v4(),
        source_type,
        stats: BatchStats {
            processed: normalized.drafts.len(),
            failed: normalized.errors.len(),
        },
        mapping_used,
        errors: normalized.errors,
    };

    tracing::info!(
        retailer_id = %retailer_id,
        batch_id = %outcome.batch_id,
        source_type = %source_type,
        processed = outcome.stats.processed,
        failed = outcome.stats.failed,
        "ingest batch applied"
    );

    record_audit(pool, retailer_id, &outcome, batch.provenance_hash).await;
    Ok(outcome)
}
