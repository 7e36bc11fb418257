//! Self-learning field mapping on top of the versioned sync profile.

use smartsync_core::{ConflictRules, FieldMapping, SourceType};
use smartsync_db::{get_or_create_sync_profile, update_profile_mapping, DbError, SyncProfileRow};
use smartsync_ingest::detect_mapping;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::EngineError;

/// Mapping and rules in force for one batch.
#[derive(Debug, Clone)]
pub struct ActiveProfile {
    pub mapping: FieldMapping,
    pub rules: ConflictRules,
}

/// What to do with a stored mapping given the batch headers.
///
/// Returns `Some(new)` when detection ran and produced a non-empty mapping
/// that differs from storage, `None` when the stored mapping stands.
#[must_use]
pub fn learn_mapping<S: AsRef<str>>(stored: &FieldMapping, headers: &[S]) -> Option<FieldMapping> {
    if !stored.needs_detection(headers) {
        return None;
    }
    let detected = detect_mapping(headers);
    (!detected.is_empty() && detected != *stored).then_some(detected)
}

/// Loads (or lazily creates) the retailer's profile and, for tabular batches,
/// refreshes its mapping from `headers`.
///
/// A changed mapping is written through a version compare-and-swap. On a lost
/// race the profile is re-read and the decision repeated, up to `attempts`
/// times.
///
/// # Errors
///
/// Returns [`EngineError::Db`] on storage failure, including
/// [`DbError::ProfileConflict`] when every attempt lost its race.
pub async fn resolve_profile(
    pool: &PgPool,
    retailer_id: Uuid,
    source_type: SourceType,
    headers: Option<&[String]>,
    attempts: u32,
) -> Result<ActiveProfile, EngineError> {
    for attempt in 1..=attempts.max(1) {
        let row = get_or_create_sync_profile(pool, retailer_id, source_type).await?;
        let SyncProfileRow {
            field_mapping,
            conflict_rules,
            version,
            ..
        } = row;
        let stored = field_mapping.0;
        let rules = conflict_rules.0;

        let Some(learned) = headers.and_then(|h| learn_mapping(&stored, h)) else {
            return Ok(ActiveProfile {
                mapping: stored,
                rules,
            });
        };

        if update_profile_mapping(pool, retailer_id, version, &learned).await? {
            tracing::info!(
                retailer_id = %retailer_id,
                mapping = ?learned,
                "learned new field mapping"
            );
            return Ok(ActiveProfile {
                mapping: learned,
                rules,
            });
        }

        tracing::debug!(
            retailer_id = %retailer_id,
            attempt,
            "sync profile changed concurrently, retrying"
        );
    }

    Err(DbError::ProfileConflict { retailer_id }.into())
}
