//! Background conversation summarization. Triggered after a turn when a
//! thread's token estimate crosses the configured threshold; never
//! blocks response emission.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::{info, warn};

use banter_checkpoint::store::CheckpointStore;
use banter_core::config::LlmConfig;

use crate::provider::{ChatMessage, ChatRequest, LlmClient};

/// Messages kept verbatim after the summarized prefix is folded away.
const KEEP_TAIL: usize = 10;
/// Per-message content cap inside the summary prompt.
const PROMPT_CONTENT_CAP: usize = 200;

/// Coordinates at most one summarization task per thread; a second
/// trigger while one is running is coalesced (ignored).
pub struct Summarizer {
    llm: Arc<dyn LlmClient>,
    checkpoints: Arc<dyn CheckpointStore>,
    model: String,
    trigger_tokens: u32,
    summary_tokens: u32,
    in_flight: Arc<DashSet<String>>,
}

impl Summarizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        checkpoints: Arc<dyn CheckpointStore>,
        cfg: &LlmConfig,
    ) -> Self {
        Self {
            llm,
            checkpoints,
            model: cfg.default_model.clone(),
            trigger_tokens: cfg.summarization_trigger_tokens,
            summary_tokens: cfg.summarization_summary_tokens,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Spawn a background summarization for `thread_id` if the threshold
    /// is crossed and none is already running. Fire-and-forget.
    pub fn maybe_spawn(self: &Arc<Self>, thread_id: String, token_count: u32) {
        if token_count <= self.trigger_tokens {
            return;
        }
        if !self.in_flight.insert(thread_id.clone()) {
            // Already summarizing this thread — coalesce.
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run(&thread_id).await {
                warn!(thread_id = %thread_id, error = %e, "summarization failed, checkpoint unchanged");
            }
            this.in_flight.remove(&thread_id);
        });
    }

    /// Number of summarizations currently running (test hook).
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    async fn run(&self, thread_id: &str) -> Result<(), String> {
        let Some(mut checkpoint) = self
            .checkpoints
            .load(thread_id)
            .await
            .map_err(|e| e.to_string())?
        else {
            return Ok(());
        };

        if checkpoint.messages.len() <= KEEP_TAIL {
            return Ok(());
        }

        let split = checkpoint.messages.len() - KEEP_TAIL;
        let prefix = &checkpoint.messages[..split];

        let transcript: String = prefix
            .iter()
            .map(|m| {
                let capped: String = m.content.chars().take(PROMPT_CONTENT_CAP).collect();
                format!("{}: {}", m.role, capped)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = match &checkpoint.summary {
            Some(existing) => format!(
                "Previous summary:\n{existing}\n\nNew messages:\n{transcript}\n\n\
                 Create an updated summary combining the previous summary with the \
                 new messages. Be concise but preserve key context."
            ),
            None => format!(
                "Summarize this conversation concisely:\n{transcript}\n\n\
                 Focus on key topics, decisions, and context needed for future replies."
            ),
        };

        let request = ChatRequest {
            model: self.model.clone(),
            system: "You summarize conversations for an assistant's working memory.".to_string(),
            messages: vec![ChatMessage::User { content: prompt }],
            temperature: 0.3,
            max_tokens: self.summary_tokens,
            tools: Vec::new(),
        };

        let completion = self.llm.complete(&request).await.map_err(|e| e.to_string())?;

        checkpoint.summary = Some(completion.content);
        checkpoint.messages.drain(..split);
        checkpoint.recount();
        self.checkpoints
            .save(&checkpoint)
            .await
            .map_err(|e| e.to_string())?;

        info!(
            thread_id,
            kept = checkpoint.messages.len(),
            tokens = checkpoint.token_count,
            "conversation summarized"
        );
        Ok(())
    }
}
