use thiserror::Error;

/// Workspace-wide error taxonomy. Expected failures (policy denial,
/// validation) travel as values; panics are reserved for invariant
/// violations.
#[derive(Debug, Error)]
pub enum BanterError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tenant policy denied: {reason}")]
    PolicyDenied { reason: String },

    #[error("Provider error: {0}")]
    ProviderTransient(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Signature verification failed")]
    SignatureMismatch,

    #[error("operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BanterError {
    /// Short error code string sent to clients in `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            BanterError::InvalidRequest(_) => "INVALID_REQUEST",
            BanterError::PolicyDenied { .. } => "POLICY_DENIED",
            BanterError::ProviderTransient(_) => "PROVIDER_ERROR",
            BanterError::ProviderAuth(_) => "PROVIDER_AUTH_ERROR",
            BanterError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            BanterError::SignatureMismatch => "SIGNATURE_MISMATCH",
            BanterError::Cancelled => "CANCELLED",
            BanterError::Config(_) => "CONFIG_ERROR",
            BanterError::Serialization(_) => "SERIALIZATION_ERROR",
            BanterError::Io(_) => "IO_ERROR",
            BanterError::Timeout { .. } => "TIMEOUT",
            BanterError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller may retry the same request and hope for success.
    /// Auth failures and validation errors are final.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            BanterError::ProviderTransient(_)
                | BanterError::BackendUnavailable(_)
                | BanterError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BanterError>;
