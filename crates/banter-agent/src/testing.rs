//! Scripted provider doubles used by pipeline, orchestrator, and gateway
//! tests. Kept in the library (not `#[cfg(test)]`) so downstream crates
//! can drive full turns without network access.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::provider::{ChatRequest, Completion, LlmClient, ProviderError, ToolCall, TtsClient};
use crate::stream::StreamEvent;

/// One scripted response round for [`MockLlm`].
#[derive(Debug, Clone, Default)]
pub struct MockRound {
    pub tokens: Vec<String>,
    pub tool_calls: Vec<ToolCall>,
    /// "end_turn" or "tool_use".
    pub stop_reason: String,
}

impl MockRound {
    pub fn text(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|s| s.to_string()).collect(),
            tool_calls: Vec::new(),
            stop_reason: "end_turn".to_string(),
        }
    }

    pub fn tool_call(name: &str, input: serde_json::Value) -> Self {
        Self {
            tokens: Vec::new(),
            tool_calls: vec![ToolCall {
                id: format!("call_{name}"),
                name: name.to_string(),
                input,
            }],
            stop_reason: "tool_use".to_string(),
        }
    }
}

/// Scripted LLM. Each `stream_chat`/`complete` call consumes one round.
pub struct MockLlm {
    rounds: Mutex<VecDeque<MockRound>>,
    /// Optional pause between tokens (lets tests race cancellation).
    pub token_delay: Option<Duration>,
    /// When set, the stream emits a terminal error instead of content.
    pub error_message: Option<String>,
    calls: AtomicU32,
}

impl MockLlm {
    pub fn with_tokens(tokens: &[&str]) -> Self {
        Self::with_rounds(vec![MockRound::text(tokens)])
    }

    pub fn with_rounds(rounds: Vec<MockRound>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            token_delay: None,
            error_message: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut mock = Self::with_rounds(Vec::new());
        mock.error_message = Some(message.to_string());
        mock
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    /// Number of provider calls made (reflex turns must leave this at 0).
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_round(&self) -> MockRound {
        self.rounds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockRound::text(&["(exhausted)"]))
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn name(&self) -> &str {
        "mock-llm"
    }

    async fn complete(&self, _req: &ChatRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.error_message {
            return Err(ProviderError::Unavailable(message.clone()));
        }
        let round = self.next_round();
        Ok(Completion {
            content: round.tokens.join(""),
            model: "mock-model".to_string(),
            tokens_in: 7,
            tokens_out: round.tokens.len() as u32,
            stop_reason: round.stop_reason,
        })
    }

    async fn stream_chat(
        &self,
        _req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.error_message {
            let _ = tx
                .send(StreamEvent::Error {
                    message: message.clone(),
                })
                .await;
            return Ok(());
        }

        let round = self.next_round();
        for token in &round.tokens {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            if let Some(delay) = self.token_delay {
                tokio::time::sleep(delay).await;
            }
            if tx
                .send(StreamEvent::TextDelta {
                    text: token.clone(),
                })
                .await
                .is_err()
            {
                return Ok(());
            }
        }
        for call in &round.tool_calls {
            if tx
                .send(StreamEvent::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                })
                .await
                .is_err()
            {
                return Ok(());
            }
        }
        let _ = tx
            .send(StreamEvent::Done {
                model: "mock-model".to_string(),
                tokens_in: 7,
                tokens_out: round.tokens.len() as u32,
                stop_reason: round.stop_reason.clone(),
            })
            .await;
        Ok(())
    }
}

/// Scripted TTS: emits `chunks_per_sentence` chunks of `chunk_size`
/// bytes for every synthesized sentence.
pub struct MockTts {
    pub chunk_size: usize,
    pub chunks_per_sentence: usize,
    /// Optional pause per chunk (drives back-pressure tests).
    pub chunk_delay: Option<Duration>,
    /// When set, every synthesis call fails.
    pub fail: bool,
    calls: AtomicU32,
}

impl MockTts {
    pub fn new(chunk_size: usize, chunks_per_sentence: usize) -> Self {
        Self {
            chunk_size,
            chunks_per_sentence,
            chunk_delay: None,
            fail: false,
            calls: AtomicU32::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TtsClient for MockTts {
    fn name(&self) -> &str {
        "mock-tts"
    }

    async fn stream(
        &self,
        _text: &str,
        _voice_id: &str,
        tx: mpsc::Sender<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Api {
                status: 500,
                message: "synthesis backend exploded".to_string(),
            });
        }
        for i in 0..self.chunks_per_sentence {
            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }
            if let Some(delay) = self.chunk_delay {
                tokio::time::sleep(delay).await;
            }
            let byte = (i % 251) as u8;
            if tx.send(vec![byte; self.chunk_size]).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}
