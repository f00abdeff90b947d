//! Channel edge: tenant policy, per-tenant credential resolution,
//! webhook signature verification, and the outbound chat-platform
//! client, all behind narrow interfaces.

pub mod channel;
pub mod client;
pub mod credentials;
pub mod error;
pub mod policy;
pub mod verify;

pub use channel::Channel;
pub use credentials::ChannelCredentials;
pub use error::ChannelError;
pub use policy::TenantPolicy;
