use smartsync_core::{AppConfig, BatchStats, BatchStatus, FieldMapping, SourceType};
use smartsync_ingest::RowError;
use uuid::Uuid;

/// Knobs the engine reads from [`AppConfig`].
#[derive(Clone)]
pub struct EngineSettings {
    pub max_upload_bytes: usize,
    pub profile_cas_retries: u32,
    /// Salt for session token and agent key digests.
    pub api_key_hash_salt: String,
}

impl EngineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            profile_cas_retries: config.profile_cas_retries,
            api_key_hash_salt: config.api_key_hash_salt.clone(),
        }
    }
}

impl std::fmt::Debug for EngineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSettings")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("profile_cas_retries", &self.profile_cas_retries)
            .field("api_key_hash_salt", &"[redacted]")
            .finish()
    }
}

/// Result of one ingest, webhook, snapshot, or delta call.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub batch_id: Uuid,
    pub source_type: SourceType,
    pub stats: BatchStats,
    pub mapping_used: FieldMapping,
    /// Every rejected row, uncapped. The audit entry keeps the first 50.
    pub errors: Vec<RowError>,
}

impl IngestOutcome {
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        self.stats.status()
    }

    #[must_use]
    pub fn message(&self) -> &'static str {
        match self.status() {
            BatchStatus::Success => "Sync completed",
            BatchStatus::Partial => "Sync completed with errors",
            BatchStatus::Failed => "Sync failed",
        }
    }
}
