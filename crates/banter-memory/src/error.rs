use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
