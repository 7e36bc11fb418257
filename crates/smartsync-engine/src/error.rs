use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ingest error: {0}")]
    Ingest(#[from] smartsync_ingest::IngestError),

    #[error("database error: {0}")]
    Db(#[from] smartsync_db::DbError),

    #[error("agent is not allowed to write back")]
    WriteBackNotAllowed,

    #[error("command not found or already finalized")]
    CommandNotFound,

    #[error("invalid acknowledgement status: {0}")]
    InvalidAckStatus(String),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
