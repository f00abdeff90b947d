use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use banter_core::config::SESSION_STORE_TIMEOUT_SECS;

use crate::error::{Result, SessionError};
use crate::store::SessionStore;
use crate::types::{Session, SessionKey};

/// Remote key-value session store.
///
/// Speaks a small JSON REST protocol against an external KV service:
///   GET    /kv/{key}            → 200 body | 404
///   PUT    /kv/{key}            → 200 (unconditional set)
///   PUT    /kv/{key}?nx=true    → 200 created | 409 already exists
///   DELETE /kv/{key}            → 200 | 404
///
/// The `nx` create keeps the uniqueness invariant atomic on the server:
/// the loser of a create race gets 409 and reads the winner's session
/// back. Every operation carries the session-store timeout.
pub struct RemoteKvSessionStore {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RemoteKvSessionStore {
    /// `base_url` must not include a trailing slash.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(SESSION_STORE_TIMEOUT_SECS))
    }

    /// Same store with an explicit per-operation timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    fn url(&self, key: &SessionKey) -> String {
        format!("{}/kv/{}", self.base_url, key.format())
    }

    fn classify(&self, e: reqwest::Error) -> SessionError {
        if e.is_timeout() {
            SessionError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            SessionError::Backend(e.to_string())
        }
    }

    async fn fetch(&self, key: &SessionKey) -> Result<Option<Session>> {
        let resp = self
            .client
            .get(self.url(key))
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        match resp.status().as_u16() {
            404 => Ok(None),
            s if (200..300).contains(&s) => {
                let body = resp.text().await.map_err(|e| self.classify(e))?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            s => Err(SessionError::Backend(format!("kv GET returned {s}"))),
        }
    }

    async fn put(&self, key: &SessionKey, session: &Session, if_absent: bool) -> Result<bool> {
        let mut url = self.url(key);
        if if_absent {
            url.push_str("?nx=true");
        }
        let resp = self
            .client
            .put(url)
            .json(session)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        match resp.status().as_u16() {
            409 => Ok(false),
            s if (200..300).contains(&s) => Ok(true),
            s => Err(SessionError::Backend(format!("kv PUT returned {s}"))),
        }
    }
}

#[async_trait]
impl SessionStore for RemoteKvSessionStore {
    async fn get_or_create(&self, key: &SessionKey) -> Result<Session> {
        if let Some(existing) = self.fetch(key).await? {
            return Ok(existing);
        }

        let fresh = Session::create(key);
        if self.put(key, &fresh, true).await? {
            debug!(key = %key, id = %fresh.id, "created remote session");
            return Ok(fresh);
        }

        // Lost the create race — read the winner back.
        self.fetch(key).await?.ok_or_else(|| {
            warn!(key = %key, "kv create conflicted but read-back found nothing");
            SessionError::Backend("create conflict with no readable session".into())
        })
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        self.fetch(key).await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let key = session.key().ok_or_else(|| {
            SessionError::InvalidKey("session metadata lacks channel/user_id".into())
        })?;
        self.put(&key, session, false).await?;
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(key))
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let status = resp.status().as_u16();
        if (200..300).contains(&status) || status == 404 {
            Ok(())
        } else {
            Err(SessionError::Backend(format!("kv DELETE returned {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        routing::get,
        Router,
    };
    use dashmap::DashMap;
    use serde::Deserialize;

    /// In-process stand-in for the KV service. `deny_first_get` makes
    /// the next GET for a key 404 even when a value exists, which is
    /// how the tests stage a lost create race.
    #[derive(Default)]
    struct KvState {
        items: DashMap<String, String>,
        deny_first_get: Mutex<HashSet<String>>,
    }

    #[derive(Deserialize)]
    struct PutParams {
        #[serde(default)]
        nx: bool,
    }

    async fn kv_get(
        State(state): State<Arc<KvState>>,
        Path(key): Path<String>,
    ) -> (StatusCode, String) {
        if state.deny_first_get.lock().unwrap().remove(&key) {
            return (StatusCode::NOT_FOUND, String::new());
        }
        match state.items.get(&key) {
            Some(v) => (StatusCode::OK, v.clone()),
            None => (StatusCode::NOT_FOUND, String::new()),
        }
    }

    async fn kv_put(
        State(state): State<Arc<KvState>>,
        Path(key): Path<String>,
        Query(params): Query<PutParams>,
        body: String,
    ) -> StatusCode {
        if params.nx && state.items.contains_key(&key) {
            return StatusCode::CONFLICT;
        }
        state.items.insert(key, body);
        StatusCode::OK
    }

    async fn kv_delete(State(state): State<Arc<KvState>>, Path(key): Path<String>) -> StatusCode {
        match state.items.remove(&key) {
            Some(_) => StatusCode::OK,
            None => StatusCode::NOT_FOUND,
        }
    }

    async fn spawn_kv_server(state: Arc<KvState>) -> String {
        let router = Router::new()
            .route("/kv/{key}", get(kv_get).put(kv_put).delete(kv_delete))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}")
    }

    fn key() -> SessionKey {
        SessionKey::new("acme", "line", "u1")
    }

    #[tokio::test]
    async fn get_or_create_is_stable_across_calls() {
        let kv = Arc::new(KvState::default());
        let store = RemoteKvSessionStore::new(spawn_kv_server(Arc::clone(&kv)).await);

        assert!(store.get(&key()).await.unwrap().is_none());

        let first = store.get_or_create(&key()).await.unwrap();
        let second = store.get_or_create(&key()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.thread_id, second.thread_id);

        let fetched = store.get(&key()).await.unwrap().unwrap();
        assert_eq!(fetched.id, first.id);
    }

    #[tokio::test]
    async fn lost_create_race_reads_back_the_winner() {
        let kv = Arc::new(KvState::default());

        // The winner's session is already stored, but the loser's first
        // GET misses it (the race window), so it goes down the nx-create
        // path and must recover via 409 + read-back.
        let winner = Session::create(&key());
        kv.items
            .insert(key().format(), serde_json::to_string(&winner).unwrap());
        kv.deny_first_get.lock().unwrap().insert(key().format());

        let store = RemoteKvSessionStore::new(spawn_kv_server(Arc::clone(&kv)).await);
        let session = store.get_or_create(&key()).await.unwrap();
        assert_eq!(session.id, winner.id);
        assert_eq!(session.thread_id, winner.thread_id);
    }

    #[tokio::test]
    async fn save_roundtrips_and_delete_tombstones() {
        let kv = Arc::new(KvState::default());
        let store = RemoteKvSessionStore::new(spawn_kv_server(Arc::clone(&kv)).await);

        let mut session = store.get_or_create(&key()).await.unwrap();
        session.touch();
        session
            .metadata
            .insert("display_name".into(), serde_json::json!("Alice"));
        store.save(&session).await.unwrap();

        let loaded = store.get(&key()).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.metadata.get("display_name").unwrap(), "Alice");

        store.delete(&key()).await.unwrap();
        assert!(store.get(&key()).await.unwrap().is_none());
        // Deleting an already-absent key is not an error.
        store.delete(&key()).await.unwrap();
    }

    #[tokio::test]
    async fn stalled_backend_classifies_as_timeout() {
        // Accept connections but never answer; the client must give up
        // with a Timeout, not a generic backend error.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    drop(socket);
                });
            }
        });

        let store = RemoteKvSessionStore::with_timeout(
            format!("http://{addr}"),
            Duration::from_millis(200),
        );
        let err = store.get(&key()).await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
    }

    #[tokio::test]
    async fn unexpected_status_classifies_as_backend_error() {
        // A bare router with no /kv route answers 404 to PUTs as well,
        // which the create path must not mistake for success. Stage it
        // by pointing the store at the KV server's root path space.
        let kv = Arc::new(KvState::default());
        let base = spawn_kv_server(Arc::clone(&kv)).await;
        let store = RemoteKvSessionStore::new(format!("{base}/nowhere"));

        let err = store.get_or_create(&key()).await.unwrap_err();
        assert!(matches!(err, SessionError::Backend(_)));
    }
}
