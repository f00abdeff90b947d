use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use banter_core::config::{LlmConfig, TtsConfig};

use crate::stream::StreamEvent;

/// A single message in the conversation sent to an LLM provider.
///
/// Tool use and tool results are first-class variants so the tool loop
/// can replay them; each provider maps them to its own wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
    /// A tool call the assistant made earlier in the loop.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The result returned for a prior tool call.
    ToolResult { id: String, content: String },
}

/// Tool definition advertised to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from an LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Tools to expose. Empty disables tool use entirely.
    pub tools: Vec<ToolDefinition>,
}

/// Response from an LLM provider (non-streaming).
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

/// Common interface for LLM providers.
///
/// Streams are lazy, finite, and non-restartable; the cancellation token
/// is honored at every network read so no call blocks uncancellably.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Non-streaming completion (used by the summarizer and webhook path
    /// fallbacks).
    async fn complete(&self, req: &ChatRequest) -> Result<Completion, ProviderError>;

    /// Stream response events through `tx` until `Done` or `Error`.
    async fn stream_chat(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError>;
}

/// Common interface for TTS providers.
#[async_trait]
pub trait TtsClient: Send + Sync {
    fn name(&self) -> &str;

    /// Stream synthesized audio bytes for one utterance into `tx`.
    /// The text has already been cleaned for synthesis.
    async fn stream(
        &self,
        text: &str,
        voice_id: &str,
        tx: mpsc::Sender<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Collapse an HTTP status into the error taxonomy: 401/403 are
    /// authentication failures (non-retriable), everything else is a
    /// plain API error.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth(message),
            _ => ProviderError::Api { status, message },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth(_))
    }
}

/// LLM provider selection, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(ProviderKind::OpenAi),
            "anthropic" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }
}

/// Build the configured LLM client. Unknown provider names fail startup.
pub fn build_llm_client(cfg: &LlmConfig) -> Result<std::sync::Arc<dyn LlmClient>, ProviderError> {
    match ProviderKind::parse(&cfg.provider) {
        Some(ProviderKind::OpenAi) => Ok(std::sync::Arc::new(crate::openai::OpenAiClient::new(
            cfg.api_key.clone(),
            cfg.base_url.clone(),
            cfg.request_timeout,
        ))),
        Some(ProviderKind::Anthropic) => Ok(std::sync::Arc::new(
            crate::anthropic::AnthropicClient::new(
                cfg.api_key.clone(),
                cfg.base_url.clone(),
                cfg.request_timeout,
            ),
        )),
        None => Err(ProviderError::Unavailable(format!(
            "unknown LLM provider '{}'",
            cfg.provider
        ))),
    }
}

/// TTS provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsKind {
    ElevenLabs,
}

impl TtsKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "elevenlabs" => Some(TtsKind::ElevenLabs),
            _ => None,
        }
    }
}

/// Build the configured TTS client; `None` when no API key is configured
/// (audio streaming is then disabled for every turn).
pub fn build_tts_client(
    cfg: &TtsConfig,
) -> Result<Option<std::sync::Arc<dyn TtsClient>>, ProviderError> {
    if cfg.api_key.is_empty() {
        return Ok(None);
    }
    match TtsKind::parse(&cfg.provider) {
        Some(TtsKind::ElevenLabs) => Ok(Some(std::sync::Arc::new(
            crate::elevenlabs::ElevenLabsClient::new(cfg.clone()),
        ))),
        None => Err(ProviderError::Unavailable(format!(
            "unknown TTS provider '{}'",
            cfg.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_known_names() {
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::OpenAi));
        assert_eq!(
            ProviderKind::parse("anthropic"),
            Some(ProviderKind::Anthropic)
        );
        assert_eq!(ProviderKind::parse("voodoo"), None);
    }

    #[test]
    fn auth_statuses_classify_as_auth() {
        assert!(ProviderError::from_status(401, "no".into()).is_auth());
        assert!(ProviderError::from_status(403, "no".into()).is_auth());
        assert!(!ProviderError::from_status(500, "boom".into()).is_auth());
    }

    #[test]
    fn missing_tts_key_disables_audio() {
        let cfg = TtsConfig::default();
        assert!(build_tts_client(&cfg).unwrap().is_none());
    }
}
