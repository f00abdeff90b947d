use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Billing/administrative scope. Every inbound message is attributable to
/// exactly one tenant; the id is opaque and never normalized beyond trimming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Stable session identifier (UUIDv7 — time-sortable for easier log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Per-turn identifier (random UUID, never persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(pub String);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Emotional tone detected from a user turn. Evaluated once per turn,
/// before dispatch; never re-evaluated mid-turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Frustrated,
    Urgent,
    Confused,
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emotion::Neutral => write!(f, "neutral"),
            Emotion::Happy => write!(f, "happy"),
            Emotion::Frustrated => write!(f, "frustrated"),
            Emotion::Urgent => write!(f, "urgent"),
            Emotion::Confused => write!(f, "confused"),
        }
    }
}

/// A message received from an external channel, normalized at the edge.
/// Built once by the channel adapter and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessageIn {
    /// Owning tenant (from header, webhook route, or connection handshake).
    pub tenant_id: String,

    /// Logical channel name (e.g. "line", "websocket").
    pub channel: String,

    /// Platform-native identifier for the sender.
    pub user_external_id: String,

    /// Plain text content of the message.
    pub text: String,

    /// Channel-specific hints (reply tokens, source type, event ids).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ChannelMessageIn {
    pub fn new(
        tenant_id: impl Into<String>,
        channel: impl Into<String>,
        user_external_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into().trim().to_string(),
            channel: channel.into().trim().to_string(),
            user_external_id: user_external_id.into().trim().to_string(),
            text: text.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// String-typed metadata lookup; missing or non-string values yield `None`.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// A message to be delivered to an external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessageOut {
    pub tenant_id: String,
    pub channel: String,

    /// Platform-native identifier for the recipient (user, group, or room).
    pub target_id: String,

    pub text: String,

    /// Metadata carried over from the inbound message (reply handles etc.).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ChannelMessageOut {
    /// Build the outbound reply for an inbound message, carrying its metadata
    /// so the adapter can use reply handles when present.
    pub fn reply_to(inbound: &ChannelMessageIn, text: impl Into<String>) -> Self {
        Self {
            tenant_id: inbound.tenant_id.clone(),
            channel: inbound.channel.clone(),
            target_id: inbound.user_external_id.clone(),
            text: text.into(),
            metadata: inbound.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_trims_whitespace() {
        assert_eq!(TenantId::new("  acme ").as_str(), "acme");
    }

    #[test]
    fn emotion_serializes_lowercase() {
        let json = serde_json::to_string(&Emotion::Frustrated).unwrap();
        assert_eq!(json, "\"frustrated\"");
    }

    #[test]
    fn reply_to_carries_metadata() {
        let mut meta = serde_json::Map::new();
        meta.insert("reply_token".into(), serde_json::json!("rt-1"));
        let inbound = ChannelMessageIn::new("t1", "line", "u1", "hi").with_metadata(meta);
        let out = ChannelMessageOut::reply_to(&inbound, "hello");
        assert_eq!(out.target_id, "u1");
        assert_eq!(out.metadata.get("reply_token").unwrap(), "rt-1");
    }
}
