pub mod agents;
pub mod app_config;
pub mod config;
pub mod mapping;
pub mod sync;

pub use agents::{AgentStatus, CommandStatus};
pub use app_config::{AppConfig, Environment};
pub use config::{configured_log_level, load_app_config, load_app_config_from_env};
pub use mapping::{CanonicalField, ConflictRules, FieldMapping};
pub use sync::{BatchStats, BatchStatus, SourceType};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Error raised when a stored status/enum string does not match any known variant.
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
