pub mod dataset;
pub mod validation;
pub mod backup;
pub mod outcome;

pub use dataset::*;
pub use validation::*;
pub use backup::*;
pub use outcome::*;

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvParsing(#[from] csv::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Commit error: {0}")]
    Commit(String),

    #[error("Supervisor error: {0}")]
    Supervisor(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, IngestionError>;
