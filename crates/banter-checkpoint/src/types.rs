use serde::{Deserialize, Serialize};

/// A single message in a checkpointed conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMessage {
    /// "user" or "assistant".
    pub role: String,
    pub content: String,
    /// RFC3339 timestamp.
    pub timestamp: String,
}

impl CheckpointMessage {
    pub fn now(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Persisted conversation state for one thread.
///
/// Messages are append-only within a turn. Once `token_count` crosses the
/// summarization trigger, a background task folds a contiguous prefix of
/// `messages` into `summary` and truncates the prefix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    #[serde(default)]
    pub messages: Vec<CheckpointMessage>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Estimated token footprint of `messages` (summary excluded).
    #[serde(default)]
    pub token_count: u32,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            ..Default::default()
        }
    }

    /// Append a message and bump the token estimate.
    pub fn push(&mut self, message: CheckpointMessage) {
        self.token_count += estimate_tokens(&message.content);
        self.messages.push(message);
    }

    /// Recompute `token_count` from scratch (used after summarization
    /// truncates the prefix).
    pub fn recount(&mut self) {
        self.token_count = self
            .messages
            .iter()
            .map(|m| estimate_tokens(&m.content))
            .sum();
    }
}

/// Cheap token estimate: ~4 characters per token. Close enough to drive
/// the summarization trigger; never used for billing.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.chars().count() as u32).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_grows_token_count() {
        let mut cp = Checkpoint::new("th1");
        cp.push(CheckpointMessage::now("user", "hello there friend"));
        assert!(cp.token_count > 0);
        assert_eq!(cp.messages.len(), 1);
    }

    #[test]
    fn recount_matches_sum_of_messages() {
        let mut cp = Checkpoint::new("th1");
        cp.push(CheckpointMessage::now("user", "aaaa"));
        cp.push(CheckpointMessage::now("assistant", "bbbbbbbb"));
        let counted = cp.token_count;
        cp.recount();
        assert_eq!(cp.token_count, counted);
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
