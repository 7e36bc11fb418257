use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("CSV decode error: {0}")]
    Csv(#[from] csv::Error),

    #[error("workbook decode error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("workbook contains no worksheets")]
    NoWorksheet,

    #[error("temporary file error: {0}")]
    TempFile(#[from] std::io::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
}
