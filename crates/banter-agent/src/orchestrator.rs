use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use banter_checkpoint::store::CheckpointStore;
use banter_checkpoint::types::CheckpointMessage;
use banter_core::config::{LlmConfig, TtsConfig};
use banter_core::error::BanterError;
use banter_core::persona::Persona;
use banter_core::types::{Emotion, TurnId};
use banter_memory::store::MemoryStore;

use crate::emotion::EmotionDetector;
use crate::pipeline::{run_streaming_turn, synthesize_single};
use crate::provider::{ChatMessage, ChatRequest, LlmClient, TtsClient};
use crate::reflex::ReflexMatcher;
use crate::summarize::Summarizer;
use crate::tools::{tool_definitions, ToolContext};
use crate::turn::{TextChunk, TurnEvent, TurnMetadata, TurnPath};

/// Most recent history messages replayed to the LLM per turn. The
/// summarizer keeps threads short, this is the hard backstop.
const HISTORY_WINDOW: usize = 40;
/// Event channel capacity per turn.
const TURN_EVENT_CAPACITY: usize = 256;

/// Everything needed to start one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    /// Checkpoint thread (see `banter_checkpoint::resolve_thread_id`).
    pub thread_id: String,
    pub user_id: String,
    pub text: String,
    pub stream_audio: bool,
    pub voice_id: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub user_name: Option<String>,
    pub audio_features: Option<HashMap<String, f64>>,
}

impl TurnRequest {
    pub fn text_only(session_id: &str, thread_id: &str, user_id: &str, text: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            stream_audio: false,
            voice_id: None,
            model: None,
            temperature: None,
            max_tokens: None,
            user_name: None,
            audio_features: None,
        }
    }
}

/// Registered state of the active turn on one session.
struct ActiveTurn {
    turn_id: TurnId,
    cancel: CancellationToken,
    /// Flips to true once the turn task has fully unwound.
    done_rx: watch::Receiver<bool>,
}

/// Dual-system turn orchestrator.
///
/// Per session there is at most one active turn; starting a new turn
/// preempts the old one (barge-in) and the new turn does not emit until
/// the old one's cancellation has fully unwound. The turn table is the
/// single critical section guarding that ordering.
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    tts: Option<Arc<dyn TtsClient>>,
    checkpoints: Arc<dyn CheckpointStore>,
    memory: Arc<dyn MemoryStore>,
    summarizer: Arc<Summarizer>,
    reflex: ReflexMatcher,
    emotion: EmotionDetector,
    persona: Persona,
    llm_cfg: LlmConfig,
    tts_cfg: TtsConfig,
    turns: DashMap<String, ActiveTurn>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tts: Option<Arc<dyn TtsClient>>,
        checkpoints: Arc<dyn CheckpointStore>,
        memory: Arc<dyn MemoryStore>,
        persona: Persona,
        llm_cfg: LlmConfig,
        tts_cfg: TtsConfig,
    ) -> Arc<Self> {
        let summarizer = Arc::new(Summarizer::new(
            Arc::clone(&llm),
            Arc::clone(&checkpoints),
            &llm_cfg,
        ));
        Arc::new(Self {
            llm,
            tts,
            checkpoints,
            memory,
            summarizer,
            reflex: ReflexMatcher::new(),
            emotion: EmotionDetector::new(),
            persona,
            llm_cfg,
            tts_cfg,
            turns: DashMap::new(),
        })
    }

    /// Start a turn and return its event stream.
    ///
    /// The returned receiver yields `Text`/`Audio`/`Metadata` events and
    /// ends with exactly one of `Completed`, `Interrupted`, or `Error`.
    /// If the session already has an active turn, that turn is cancelled
    /// first and emits `Interrupted` on its own stream before this one
    /// produces anything.
    pub fn process(self: &Arc<Self>, request: TurnRequest) -> mpsc::Receiver<TurnEvent> {
        let (events, rx) = mpsc::channel(TURN_EVENT_CAPACITY);
        let turn_id = TurnId::new();
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        // Single critical section: register (or replace) the active turn.
        let previous = self.turns.insert(
            request.session_id.clone(),
            ActiveTurn {
                turn_id: turn_id.clone(),
                cancel: cancel.clone(),
                done_rx,
            },
        );

        let this = Arc::clone(self);
        let session_id = request.session_id.clone();
        let task_turn_id = turn_id.clone();
        tokio::spawn(async move {
            // Barge-in: cancel the outstanding turn and wait for it to
            // fully unwind before emitting anything.
            if let Some(prev) = previous {
                debug!(session = %session_id, "preempting active turn");
                prev.cancel.cancel();
                let mut rx = prev.done_rx;
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            }

            if cancel.is_cancelled() {
                // We were preempted before producing anything.
                let _ = events
                    .send(TurnEvent::Interrupted {
                        at_text_chunk: 0,
                        at_audio_chunk: 0,
                    })
                    .await;
            } else {
                this.run_turn(&request, task_turn_id.clone(), &events, &cancel)
                    .await;
            }

            let _ = done_tx.send(true);
            this.turns
                .remove_if(&session_id, |_, t| t.turn_id == task_turn_id);
        });

        rx
    }

    /// Idempotent cancellation of whatever turn is active on the session.
    /// The turn itself emits the `Interrupted` marker on its stream.
    pub fn interrupt(&self, session_id: &str) {
        if let Some(turn) = self.turns.get(session_id) {
            info!(session = %session_id, "interrupting active turn");
            turn.cancel.cancel();
        }
    }

    /// Cancel every active turn (process shutdown).
    pub fn interrupt_all(&self) {
        for entry in self.turns.iter() {
            entry.cancel.cancel();
        }
    }

    /// Whether the session currently has an active turn (test hook).
    pub fn has_active_turn(&self, session_id: &str) -> bool {
        self.turns.contains_key(session_id)
    }

    /// Single-response mode for webhook channels: run the turn to
    /// completion and return the accumulated text. Blocks through
    /// interruptions; never exposes them to the caller.
    pub async fn respond(self: &Arc<Self>, request: TurnRequest) -> Result<String, BanterError> {
        let mut rx = self.process(request);
        let mut full_text = String::new();
        while let Some(event) = rx.recv().await {
            match event {
                TurnEvent::Text(chunk) => full_text.push_str(&chunk.text),
                TurnEvent::Error { code, message } => {
                    return Err(match code {
                        "PROVIDER_AUTH_ERROR" => BanterError::ProviderAuth(message),
                        "BACKEND_UNAVAILABLE" => BanterError::BackendUnavailable(message),
                        _ => BanterError::ProviderTransient(message),
                    });
                }
                TurnEvent::Completed | TurnEvent::Interrupted { .. } => break,
                _ => {}
            }
        }
        Ok(full_text)
    }

    async fn run_turn(
        &self,
        request: &TurnRequest,
        turn_id: TurnId,
        events: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) {
        let started = Instant::now();
        let emotion = self
            .emotion
            .detect(&request.text, request.audio_features.as_ref());

        if self.reflex.can_handle(&request.text) {
            self.run_reflex_turn(request, turn_id, emotion, started, events, cancel)
                .await;
        } else {
            self.run_cognition_turn(request, turn_id, emotion, started, events, cancel)
                .await;
        }
    }

    /// Reflex path: deterministic reply, no model call, no checkpoint.
    async fn run_reflex_turn(
        &self,
        request: &TurnRequest,
        turn_id: TurnId,
        emotion: Emotion,
        started: Instant,
        events: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) {
        let reply = self
            .reflex
            .respond(&request.text, request.user_name.as_deref());
        debug!(session = %request.session_id, emotion = %emotion, "reflex turn");

        if events
            .send(TurnEvent::Text(TextChunk {
                turn_id: turn_id.clone(),
                sequence_index: 1,
                text: reply.text.clone(),
                is_final: true,
            }))
            .await
            .is_err()
        {
            return;
        }

        let mut audio_chunks = 0;
        if request.stream_audio {
            if let Some(tts) = &self.tts {
                audio_chunks = synthesize_single(
                    Arc::clone(tts),
                    self.resolve_voice(request),
                    turn_id.clone(),
                    &reply.text,
                    events.clone(),
                    cancel.clone(),
                )
                .await;
            }
        }

        if cancel.is_cancelled() {
            let _ = events
                .send(TurnEvent::Interrupted {
                    at_text_chunk: 1,
                    at_audio_chunk: audio_chunks,
                })
                .await;
            return;
        }

        let _ = events
            .send(TurnEvent::Metadata(TurnMetadata {
                turn_id,
                path: TurnPath::Reflex,
                emotion,
                model: None,
                tokens_in: 0,
                tokens_out: 0,
                execution_time_ms: started.elapsed().as_millis() as u64,
                text_chunks: 1,
                audio_chunks,
            }))
            .await;
        let _ = events.send(TurnEvent::Completed).await;
    }

    /// Cognition path: checkpointed history, streaming pipeline, tools.
    async fn run_cognition_turn(
        &self,
        request: &TurnRequest,
        turn_id: TurnId,
        emotion: Emotion,
        started: Instant,
        events: &mpsc::Sender<TurnEvent>,
        cancel: &CancellationToken,
    ) {
        let checkpoint = match self.checkpoints.load(&request.thread_id).await {
            Ok(cp) => cp,
            Err(e) => {
                warn!(error = %e, thread = %request.thread_id, "checkpoint load failed");
                let _ = events
                    .send(TurnEvent::Error {
                        code: "BACKEND_UNAVAILABLE",
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let chat_request = self.build_chat_request(request, checkpoint.as_ref());
        let tts = if request.stream_audio {
            self.tts.clone()
        } else {
            None
        };

        let outcome = run_streaming_turn(
            Arc::clone(&self.llm),
            tts,
            chat_request,
            self.resolve_voice(request),
            turn_id.clone(),
            Some(ToolContext {
                memory: Arc::clone(&self.memory),
                user_id: request.user_id.clone(),
            }),
            events.clone(),
            cancel.clone(),
        )
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let code = if e.is_auth() {
                    "PROVIDER_AUTH_ERROR"
                } else {
                    "PROVIDER_ERROR"
                };
                warn!(error = %e, session = %request.session_id, "cognition turn failed");
                let _ = events
                    .send(TurnEvent::Error {
                        code,
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        if outcome.cancelled {
            let _ = events
                .send(TurnEvent::Interrupted {
                    at_text_chunk: outcome.text_chunks,
                    at_audio_chunk: outcome.audio_chunks,
                })
                .await;
            return;
        }

        info!(
            session = %request.session_id,
            tokens_in = outcome.tokens_in,
            tokens_out = outcome.tokens_out,
            text_chunks = outcome.text_chunks,
            audio_chunks = outcome.audio_chunks,
            "cognition turn complete"
        );

        // Persist both turns, then let the summarizer decide whether the
        // thread needs folding. None of this blocks frame emission — the
        // stream ends with Completed below either way.
        if !outcome.full_text.is_empty() {
            let user_msg = CheckpointMessage::now("user", request.text.clone());
            let assistant_msg = CheckpointMessage::now("assistant", outcome.full_text.clone());
            if let Err(e) = self.checkpoints.append(&request.thread_id, user_msg).await {
                warn!(error = %e, "failed to append user turn");
            }
            if let Err(e) = self
                .checkpoints
                .append(&request.thread_id, assistant_msg)
                .await
            {
                warn!(error = %e, "failed to append assistant turn");
            }
            if let Ok(Some(cp)) = self.checkpoints.load(&request.thread_id).await {
                self.summarizer
                    .maybe_spawn(request.thread_id.clone(), cp.token_count);
            }
        }

        let _ = events
            .send(TurnEvent::Metadata(TurnMetadata {
                turn_id,
                path: TurnPath::Cognition,
                emotion,
                model: outcome.model,
                tokens_in: outcome.tokens_in,
                tokens_out: outcome.tokens_out,
                execution_time_ms: started.elapsed().as_millis() as u64,
                text_chunks: outcome.text_chunks,
                audio_chunks: outcome.audio_chunks,
            }))
            .await;
        let _ = events.send(TurnEvent::Completed).await;
    }

    fn build_chat_request(
        &self,
        request: &TurnRequest,
        checkpoint: Option<&banter_checkpoint::types::Checkpoint>,
    ) -> ChatRequest {
        let mut system = self.persona.render();
        if let Some(summary) = checkpoint.and_then(|cp| cp.summary.as_deref()) {
            system.push_str(&format!("\n\nSummary of the conversation so far:\n{summary}"));
        }

        let mut messages: Vec<ChatMessage> = Vec::new();
        if let Some(cp) = checkpoint {
            let skip = cp.messages.len().saturating_sub(HISTORY_WINDOW);
            for m in cp.messages.iter().skip(skip) {
                messages.push(if m.role == "assistant" {
                    ChatMessage::Assistant {
                        content: m.content.clone(),
                    }
                } else {
                    ChatMessage::User {
                        content: m.content.clone(),
                    }
                });
            }
        }
        messages.push(ChatMessage::User {
            content: request.text.clone(),
        });

        ChatRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.llm_cfg.default_model.clone()),
            system,
            messages,
            temperature: request
                .temperature
                .unwrap_or(self.llm_cfg.default_temperature),
            max_tokens: request.max_tokens.unwrap_or(self.llm_cfg.default_max_tokens),
            tools: tool_definitions(),
        }
    }

    fn resolve_voice(&self, request: &TurnRequest) -> String {
        request
            .voice_id
            .clone()
            .unwrap_or_else(|| self.tts_cfg.default_voice_id.clone())
    }
}
