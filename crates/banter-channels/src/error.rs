use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel '{channel}' is not configured")]
    NotConfigured { channel: String },

    #[error("no delivery credentials for tenant '{tenant}' on '{channel}'")]
    NoCredentials { tenant: String, channel: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("delivery failed ({status}): {body}")]
    DeliveryFailed { status: u16, body: String },

    #[error("delivery timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("credentials file error: {0}")]
    Credentials(String),
}
