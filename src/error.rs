use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    /// A metric outside the closed enum reached a strict conversion.
    /// Raised only when the validator was bypassed.
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Invalid query spec: {0}")]
    InvalidSpec(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Row source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, DashError>;
