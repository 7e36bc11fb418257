use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::UnknownVariant;

/// The channel an ingest call arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    FileUpload,
    ApiPush,
    Webhook,
    SecureAgent,
}

impl SourceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::FileUpload => "FILE_UPLOAD",
            SourceType::ApiPush => "API_PUSH",
            SourceType::Webhook => "WEBHOOK",
            SourceType::SecureAgent => "SECURE_AGENT",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FILE_UPLOAD" => Ok(SourceType::FileUpload),
            "API_PUSH" => Ok(SourceType::ApiPush),
            "WEBHOOK" => Ok(SourceType::Webhook),
            "SECURE_AGENT" => Ok(SourceType::SecureAgent),
            other => Err(UnknownVariant {
                kind: "source type",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome of one ingest call as recorded in the audit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Success,
    Partial,
    Failed,
}

impl BatchStatus {
    /// `SUCCESS` when nothing failed, `PARTIAL` when some rows landed and some
    /// did not, `FAILED` otherwise.
    #[must_use]
    pub fn from_counts(processed: usize, failed: usize) -> Self {
        if failed == 0 {
            BatchStatus::Success
        } else if processed > 0 {
            BatchStatus::Partial
        } else {
            BatchStatus::Failed
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Success => "SUCCESS",
            BatchStatus::Partial => "PARTIAL",
            BatchStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(BatchStatus::Success),
            "PARTIAL" => Ok(BatchStatus::Partial),
            "FAILED" => Ok(BatchStatus::Failed),
            other => Err(UnknownVariant {
                kind: "batch status",
                value: other.to_string(),
            }),
        }
    }
}

/// Per-call pass/fail counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub processed: usize,
    pub failed: usize,
}

impl BatchStats {
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        BatchStatus::from_counts(self.processed, self.failed)
    }
}
