use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session key: {0}")]
    InvalidKey(String),

    #[error("session not found: {key}")]
    NotFound { key: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("backend unavailable: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store operation timed out after {secs}s")]
    Timeout { secs: u64 },
}

pub type Result<T> = std::result::Result<T, SessionError>;
