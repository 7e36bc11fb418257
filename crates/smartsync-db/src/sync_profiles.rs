//! Database operations for `sync_profiles`.
//!
//! A profile is mutated by ordinary ingest traffic (the learned field
//! mapping), so writes go through a version compare-and-swap instead of a
//! blind `UPDATE`.

use chrono::{DateTime, Utc};
use smartsync_core::{ConflictRules, FieldMapping, SourceType};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::DbError;

/// A row from the `sync_profiles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncProfileRow {
    pub retailer_id: Uuid,
    pub source_type: String,
    pub field_mapping: Json<FieldMapping>,
    pub conflict_rules: Json<ConflictRules>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PROFILE_COLUMNS: &str =
    "retailer_id, source_type, field_mapping, conflict_rules, version, created_at, updated_at";

/// Returns the retailer's profile, creating an empty one on first use.
///
/// Concurrent first calls race on the primary key; the loser's insert is a
/// no-op and both read the same row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert or fetch fails.
pub async fn get_or_create_sync_profile(
    pool: &PgPool,
    retailer_id: Uuid,
    source_type: SourceType,
) -> Result<SyncProfileRow, DbError> {
    sqlx::query(
        "INSERT INTO sync_profiles (retailer_id, source_type) VALUES ($1, $2) \
         ON CONFLICT (retailer_id) DO NOTHING",
    )
    .bind(retailer_id)
    .bind(source_type.as_str())
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, SyncProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM sync_profiles WHERE retailer_id = $1"
    ))
    .bind(retailer_id)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Stores a new field mapping if the profile is still at `expected_version`.
///
/// Returns `true` when the swap happened, `false` when another writer got
/// there first and the caller should re-read. The profile's `source_type`
/// keeps the channel that created it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_profile_mapping(
    pool: &PgPool,
    retailer_id: Uuid,
    expected_version: i64,
    mapping: &FieldMapping,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE sync_profiles \
         SET field_mapping = $3, version = version + 1, updated_at = NOW() \
         WHERE retailer_id = $1 AND version = $2",
    )
    .bind(retailer_id)
    .bind(expected_version)
    .bind(Json(mapping))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Replaces the retailer's conflict rules, creating the profile if needed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn set_conflict_rules(
    pool: &PgPool,
    retailer_id: Uuid,
    source_type: SourceType,
    rules: &ConflictRules,
) -> Result<SyncProfileRow, DbError> {
    let row = sqlx::query_as::<_, SyncProfileRow>(&format!(
        "INSERT INTO sync_profiles (retailer_id, source_type, conflict_rules) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (retailer_id) DO UPDATE SET \
             conflict_rules = EXCLUDED.conflict_rules, \
             version = sync_profiles.version + 1, \
             updated_at = NOW() \
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(retailer_id)
    .bind(source_type.as_str())
    .bind(Json(rules))
    .fetch_one(pool)
    .await?;

    Ok(row)
}
