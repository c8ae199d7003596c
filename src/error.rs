//! Error types for storage, history and configuration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("history io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config encode error: {0}")]
    Json(#[from] serde_json::Error),
}
