use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{Result, SessionError};
use crate::store::SessionStore;
use crate::types::{Session, SessionKey};

/// In-memory session store. The default backend for development and tests.
///
/// `DashMap::entry` gives the compare-and-set semantics the uniqueness
/// invariant requires: two concurrent creates for the same key race on
/// the same shard lock and the loser observes the winner's session.
#[derive(Default)]
pub struct MemorySessionStore {
    by_key: DashMap<SessionKey, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_or_create(&self, key: &SessionKey) -> Result<Session> {
        let entry = self
            .by_key
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(key = %key, "creating session");
                Session::create(key)
            });
        Ok(entry.value().clone())
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        Ok(self.by_key.get(key).map(|s| s.value().clone()))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let key = session.key().ok_or_else(|| {
            SessionError::InvalidKey("session metadata lacks channel/user_id".into())
        })?;
        self.by_key.insert(key, session.clone());
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<()> {
        self.by_key.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_stable_across_calls() {
        let store = MemorySessionStore::new();
        let key = SessionKey::new("acme", "line", "u1");
        let first = store.get_or_create(&key).await.unwrap();
        let second = store.get_or_create(&key).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.thread_id, second.thread_id);
    }

    #[tokio::test]
    async fn distinct_tuples_get_distinct_sessions() {
        let store = MemorySessionStore::new();
        let a = store
            .get_or_create(&SessionKey::new("acme", "line", "u1"))
            .await
            .unwrap();
        let b = store
            .get_or_create(&SessionKey::new("acme", "websocket", "u1"))
            .await
            .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn concurrent_creates_converge_on_one_session() {
        use std::sync::Arc;
        let store = Arc::new(MemorySessionStore::new());
        let key = SessionKey::new("acme", "line", "racer");
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store.get_or_create(&key).await.unwrap().id
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn delete_then_create_yields_fresh_session() {
        let store = MemorySessionStore::new();
        let key = SessionKey::new("acme", "line", "u1");
        let first = store.get_or_create(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        let second = store.get_or_create(&key).await.unwrap();
        assert_ne!(first.id, second.id);
    }
}
