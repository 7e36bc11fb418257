//! Orchestration of ingest calls and the agent protocol on top of
//! `smartsync-ingest` (pure) and `smartsync-db` (storage).

pub mod agents;
pub mod audit;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod profile;
pub mod signature;
pub mod types;

pub use agents::{
    ack_command, authenticate, enqueue_command, pull_commands, push_delta, push_snapshot,
    register_agent, RegisteredAgent, SaleDelta,
};
pub use error::EngineError;
pub use pipeline::run_ingest;
pub use signature::{sign_payload, verify_signature, SignatureError};
pub use types::{EngineSettings, IngestOutcome};
