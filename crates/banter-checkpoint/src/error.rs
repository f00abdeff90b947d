use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend unavailable: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;
