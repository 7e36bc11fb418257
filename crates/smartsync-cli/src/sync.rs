//! Operator-side sync commands: file ingest, history, conflict rules.

use std::path::Path;

use smartsync_core::{ConflictRules, SourceType};
use smartsync_engine::{run_ingest, EngineSettings};
use smartsync_ingest::IngestSource;
use uuid::Uuid;

/// Runs one file through the same pipeline as a multipart upload.
pub(crate) async fn run_ingest_file(
    pool: &sqlx::PgPool,
    config: &smartsync_core::AppConfig,
    retailer_id: Uuid,
    path: &Path,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let settings = EngineSettings::from_app_config(config);
    let outcome = run_ingest(
        pool,
        &settings,
        retailer_id,
        IngestSource::File { file_name, bytes },
    )
    .await?;

    println!("{} (batch {})", outcome.message(), outcome.batch_id);
    println!(
        "processed: {}  failed: {}",
        outcome.stats.processed, outcome.stats.failed
    );
    println!("mapping: {}", serde_json::to_string(&outcome.mapping_used)?);
    for error in outcome.errors.iter().take(20) {
        println!("  {error}");
    }
    if outcome.errors.len() > 20 {
        println!("  ... {} more", outcome.errors.len() - 20);
    }
    Ok(())
}

pub(crate) async fn run_history(
    pool: &sqlx::PgPool,
    retailer_id: Uuid,
    limit: i64,
) -> anyhow::Result<()> {
    let batches = smartsync_db::list_sync_batches(pool, retailer_id, limit.clamp(1, 200)).await?;
    if batches.is_empty() {
        println!("no sync batches recorded");
        return Ok(());
    }

    for batch in batches {
        println!(
            "{}  {:<12} {:<8} processed={:<6} failed={:<6} {}",
            batch.created_at.format("%Y-%m-%d %H:%M:%S"),
            batch.source_type,
            batch.status,
            batch.records_processed,
            batch.records_failed,
            batch.batch_id,
        );
    }
    Ok(())
}

pub(crate) async fn run_profile_lock(
    pool: &sqlx::PgPool,
    retailer_id: Uuid,
    source: SourceType,
    fields: Vec<String>,
    master_source: Option<String>,
) -> anyhow::Result<()> {
    let rules = ConflictRules {
        master_source,
        locked_fields: fields
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect(),
    };
    let profile = smartsync_db::set_conflict_rules(pool, retailer_id, source, &rules).await?;
    tracing::info!(
        retailer_id = %retailer_id,
        locked = ?profile.conflict_rules.0.locked_fields,
        "updated conflict rules"
    );
    println!(
        "conflict rules (version {}): {}",
        profile.version,
        serde_json::to_string(&profile.conflict_rules.0)?
    );
    Ok(())
}
