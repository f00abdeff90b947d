use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Session, SessionKey};

/// Store contract shared by all session backends.
///
/// Every backend must honor the uniqueness invariant atomically: a given
/// `(tenant, channel, user)` key maps to at most one live session, and
/// concurrent `get_or_create` calls for the same key return the same
/// session id. Backend selection happens once at startup — callers never
/// fall back to a different backend at request time.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the existing live session for `key`, or atomically create one.
    async fn get_or_create(&self, key: &SessionKey) -> Result<Session>;

    /// Return the session for `key` if it exists and is active.
    async fn get(&self, key: &SessionKey) -> Result<Option<Session>>;

    /// Persist an updated session body (e.g. after `touch`).
    async fn save(&self, session: &Session) -> Result<()>;

    /// Tombstone the session so the next inbound creates a fresh one.
    async fn delete(&self, key: &SessionKey) -> Result<()>;
}
