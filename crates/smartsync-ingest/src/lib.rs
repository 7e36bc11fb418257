//! Schema-agnostic ingestion for inventory feeds.
//!
//! Everything here is pure apart from the scoped temporary file used while a
//! workbook is decoded. Persistence and orchestration live in
//! `smartsync-db` and `smartsync-engine`.

pub mod detect;
pub mod error;
pub mod file;
pub mod fusion;
pub mod hash;
pub mod normalize;
pub mod parse;
pub mod source;
pub mod vocab;

pub use detect::detect_mapping;
pub use error::IngestError;
pub use fusion::{plan_batch, plan_patch, CatalogPatch};
pub use normalize::{normalize_agent_products, normalize_rows, DraftRecord, Normalized, RowError};
pub use source::{IngestSource, PreparedBatch, Vocabulary};
pub use vocab::agent_field_mapping;

/// One input record: an ordered JSON object keyed by the source's own headers.
pub type RawRow = serde_json::Map<String, serde_json::Value>;
