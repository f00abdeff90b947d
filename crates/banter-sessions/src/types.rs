use serde::{Deserialize, Serialize};

use banter_core::types::ChannelMessageIn;

use crate::error::{Result, SessionError};

/// Structured session key.
///
/// A session belongs to a `(tenant, channel, user)` tuple — Alice on
/// LINE and Alice on the WebSocket surface are different sessions even
/// when the tenant is the same.
///
/// Wire format: `tenant:{T}:channel:{C}:user:{U}`. The components are
/// taken verbatim from the inbound envelope (trimmed at the edge, no
/// further normalization).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub tenant_id: String,
    pub channel: String,
    pub user_external_id: String,
}

impl SessionKey {
    pub fn new(
        tenant_id: impl Into<String>,
        channel: impl Into<String>,
        user_external_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            channel: channel.into(),
            user_external_id: user_external_id.into(),
        }
    }

    /// Derive the key from a normalized inbound envelope.
    pub fn from_inbound(inbound: &ChannelMessageIn) -> Self {
        Self::new(
            inbound.tenant_id.clone(),
            inbound.channel.clone(),
            inbound.user_external_id.clone(),
        )
    }

    /// Return the canonical wire-format string.
    pub fn format(&self) -> String {
        format!(
            "tenant:{}:channel:{}:user:{}",
            self.tenant_id, self.channel, self.user_external_id
        )
    }

    /// Parse a wire-format key string back into a `SessionKey`.
    ///
    /// Expects exactly `tenant:<t>:channel:<c>:user:<u>` where `<u>` may
    /// itself contain colons.
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("tenant:")
            .ok_or_else(|| SessionError::InvalidKey(format!("missing 'tenant:' prefix: {s}")))?;

        let channel_marker = ":channel:";
        let channel_pos = rest
            .find(channel_marker)
            .ok_or_else(|| SessionError::InvalidKey(format!("missing ':channel:' segment: {s}")))?;
        let tenant_id = &rest[..channel_pos];
        let after_channel = &rest[channel_pos + channel_marker.len()..];

        let user_marker = ":user:";
        let user_pos = after_channel
            .find(user_marker)
            .ok_or_else(|| SessionError::InvalidKey(format!("missing ':user:' segment: {s}")))?;
        let channel = &after_channel[..user_pos];
        let user_external_id = &after_channel[user_pos + user_marker.len()..];

        if tenant_id.is_empty() || channel.is_empty() || user_external_id.is_empty() {
            return Err(SessionError::InvalidKey(format!(
                "key components must not be empty: {s}"
            )));
        }

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            channel: channel.to_string(),
            user_external_id: user_external_id.to_string(),
        })
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

/// A persisted session.
///
/// Sessions are lazy-created on first inbound message. `thread_id` is
/// stable for the session's lifetime and keys the conversation
/// checkpoint; `updated_at` only moves forward via [`Session::touch`].
///
/// The serialized record is forward-compatible: new fields must be
/// additive with serde defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// UUIDv7 primary key — time-sortable.
    pub id: String,
    pub tenant_id: String,
    /// Agent that owns this session (single-agent deployments use "default").
    pub agent_id: String,
    /// Stable conversation thread id, keys the checkpoint store.
    pub thread_id: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last activity; monotonically increasing.
    pub updated_at: String,
    /// Cleared when the session is tombstoned.
    #[serde(default = "bool_true")]
    pub is_active: bool,
    /// Carries `channel` and `user_id` plus any adapter extras.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn bool_true() -> bool {
    true
}

impl Session {
    /// Build a fresh session for a key. Both `id` and `thread_id` are new
    /// UUIDv7 values.
    pub fn create(key: &SessionKey) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let mut metadata = serde_json::Map::new();
        metadata.insert("channel".into(), serde_json::json!(key.channel));
        metadata.insert("user_id".into(), serde_json::json!(key.user_external_id));
        let id = uuid::Uuid::now_v7().to_string();
        Self {
            // The thread id keys the conversation checkpoint and stays
            // stable for the session's whole lifetime.
            thread_id: format!("session:{id}"),
            id,
            tenant_id: key.tenant_id.clone(),
            agent_id: "default".to_string(),
            created_at: now.clone(),
            updated_at: now,
            is_active: true,
            metadata,
        }
    }

    /// Reconstruct the lookup key from the session body, if the metadata
    /// still carries channel and user id.
    pub fn key(&self) -> Option<SessionKey> {
        let channel = self.metadata.get("channel")?.as_str()?;
        let user_id = self.metadata.get("user_id")?.as_str()?;
        if self.tenant_id.is_empty() {
            return None;
        }
        Some(SessionKey::new(self.tenant_id.clone(), channel, user_id))
    }

    /// Advance `updated_at` to now. Never moves the timestamp backwards.
    pub fn touch(&mut self) {
        let now = chrono::Utc::now().to_rfc3339();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}
