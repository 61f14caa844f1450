use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimtuneError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Cache write failed: {0}")]
    CacheWrite(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, SimtuneError>;
