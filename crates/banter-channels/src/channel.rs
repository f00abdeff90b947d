use async_trait::async_trait;

use banter_core::types::ChannelMessageOut;

use crate::error::ChannelError;

/// Common interface implemented by every outbound channel adapter.
///
/// Implementations must be `Send + Sync` so they can live in the
/// gateway's channel map and be driven from multiple Tokio tasks.
/// `send` takes `&self` so a connected adapter can deliver concurrently.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"line"`).
    fn name(&self) -> &str;

    /// Deliver a single outbound message.
    async fn send(&self, msg: &ChannelMessageOut) -> Result<(), ChannelError>;
}
