//! The four ingest origins, normalized at the boundary into one row shape.

use serde_json::Value;
use smartsync_core::SourceType;

use crate::{error::IngestError, file::decode_file, hash::sha256_hex, RawRow};

/// Which field vocabulary a batch's rows speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    /// Arbitrary headers resolved through the retailer's field mapping.
    Tabular,
    /// The desktop agent's fixed snapshot vocabulary.
    Agent,
}

/// A single ingest call's input, tagged by origin.
#[derive(Debug, Clone)]
pub enum IngestSource {
    /// Uploaded CSV or workbook bytes.
    File {
        file_name: Option<String>,
        bytes: Vec<u8>,
    },
    /// Row objects supplied directly by an authenticated session.
    Rows(Vec<Value>),
    /// Row objects delivered through the key-gated webhook.
    Webhook(Vec<Value>),
    /// A full inventory snapshot pushed by a polling agent.
    AgentSnapshot(Vec<Value>),
}

/// Rows ready for normalization plus the batch-level provenance.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub source_type: SourceType,
    pub vocabulary: Vocabulary,
    pub rows: Vec<RawRow>,
    /// SHA-256 of the entire raw payload.
    pub provenance_hash: String,
}

impl PreparedBatch {
    /// Headers of the first record, in their original order.
    #[must_use]
    pub fn headers(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl IngestSource {
    #[must_use]
    pub fn source_type(&self) -> SourceType {
        match self {
            IngestSource::File { .. } => SourceType::FileUpload,
            IngestSource::Rows(_) => SourceType::ApiPush,
            IngestSource::Webhook(_) => SourceType::Webhook,
            IngestSource::AgentSnapshot(_) => SourceType::SecureAgent,
        }
    }

    #[must_use]
    pub fn vocabulary(&self) -> Vocabulary {
        match self {
            IngestSource::AgentSnapshot(_) => Vocabulary::Agent,
            _ => Vocabulary::Tabular,
        }
    }

    /// Decodes and hashes the payload. File decoding blocks; callers on an
    /// async runtime should run this on the blocking pool.
    ///
    /// Array elements that are not objects become empty rows so they are
    /// counted as failed with their original row number.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::EmptyPayload`] for empty files,
    /// [`IngestError::PayloadTooLarge`] when a file exceeds `max_bytes`, or a
    /// decode error for unreadable files.
    pub fn prepare(self, max_bytes: usize) -> Result<PreparedBatch, IngestError> {
        let source_type = self.source_type();
        let vocabulary = self.vocabulary();

        let (rows, provenance_hash) = match self {
            IngestSource::File { file_name, bytes } => {
                if bytes.is_empty() {
                    return Err(IngestError::EmptyPayload);
                }
                if bytes.len() > max_bytes {
                    return Err(IngestError::PayloadTooLarge {
                        size: bytes.len(),
                        limit: max_bytes,
                    });
                }
                let rows = decode_file(file_name.as_deref(), &bytes)?;
                (rows, sha256_hex(&bytes))
            }
            IngestSource::Rows(values)
            | IngestSource::Webhook(values)
            | IngestSource::AgentSnapshot(values) => {
                let hash = sha256_hex(&serde_json::to_vec(&values)?);
                let rows = values
                    .into_iter()
                    .map(|v| match v {
                        Value::Object(map) => map,
                        _ => RawRow::new(),
                    })
                    .collect();
                (rows, hash)
            }
        };

        tracing::debug!(
            source_type = %source_type,
            rows = rows.len(),
            "prepared ingest batch"
        );

        Ok(PreparedBatch {
            source_type,
            vocabulary,
            rows,
            provenance_hash,
        })
    }
}
