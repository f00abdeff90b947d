//! The streaming pipeline: LLM token stream → sentence buffer → bounded
//! TTS queue → ordered audio frames, with text chunks emitted as tokens
//! arrive. The sentence queue is the only back-pressure point; tokens
//! are never dropped, the producer just pauses.

pub mod sentence;
pub mod tts;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use banter_core::config::SENTENCE_QUEUE_CAPACITY;
use banter_core::types::TurnId;

use crate::provider::{ChatMessage, ChatRequest, LlmClient, ProviderError, ToolCall, TtsClient};
use crate::stream::StreamEvent;
use crate::tools::{dispatch, ToolContext};
use crate::turn::{TextChunk, TurnEvent};

use sentence::SentenceBuffer;
use tts::run_tts_worker;

/// Upper bound on LLM round-trips per turn when the model keeps calling
/// tools.
const MAX_TOOL_ROUNDS: usize = 4;

/// What one pipeline run produced.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub full_text: String,
    /// Text chunks actually emitted (last one carries `is_final`).
    pub text_chunks: u64,
    /// Audio content frames emitted (the final marker is not counted).
    pub audio_chunks: u64,
    pub model: Option<String>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    /// Set when the turn was cancelled mid-stream; the caller emits the
    /// `Interrupted` marker.
    pub cancelled: bool,
}

struct AudioLane {
    queue: mpsc::Sender<Option<String>>,
    worker: tokio::task::JoinHandle<tts::TtsWorkerReport>,
}

/// Send that stays cancellable while blocked on a full channel. Returns
/// false when cancelled or the receiver is gone.
pub(crate) async fn send_or_cancel<T>(
    tx: &mpsc::Sender<T>,
    cancel: &CancellationToken,
    item: T,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Run one cognition turn through the streaming pipeline.
///
/// Text chunks are emitted with a one-token lookahead so the last chunk
/// can carry `is_final` with its content. Cancellation is observed
/// between every event and propagates to the provider and the TTS
/// worker; on cancel the sentence queue is closed without a sentinel
/// (hard stop — queued sentences are not synthesized).
pub async fn run_streaming_turn(
    llm: Arc<dyn LlmClient>,
    tts: Option<Arc<dyn TtsClient>>,
    mut request: ChatRequest,
    voice_id: String,
    turn_id: TurnId,
    tools: Option<ToolContext>,
    events: mpsc::Sender<TurnEvent>,
    cancel: CancellationToken,
) -> Result<PipelineOutcome, ProviderError> {
    let mut outcome = PipelineOutcome::default();
    let mut buffer = SentenceBuffer::new();
    // One-token lookahead: (sequence_index, text) awaiting emission.
    let mut pending: Option<(u64, String)> = None;
    let mut next_text_index: u64 = 0;

    let mut audio = tts.map(|tts_client| {
        let (queue_tx, queue_rx) = mpsc::channel::<Option<String>>(SENTENCE_QUEUE_CAPACITY);
        let worker = tokio::spawn(run_tts_worker(
            tts_client,
            voice_id.clone(),
            turn_id.clone(),
            queue_rx,
            events.clone(),
            cancel.clone(),
        ));
        AudioLane {
            queue: queue_tx,
            worker,
        }
    });

    let mut rounds = 0usize;
    let result = loop {
        rounds += 1;
        let (ev_tx, mut ev_rx) = mpsc::channel::<StreamEvent>(64);
        let llm_call = {
            let llm = Arc::clone(&llm);
            let req = request.clone();
            let call_cancel = cancel.clone();
            tokio::spawn(async move { llm.stream_chat(&req, ev_tx, &call_cancel).await })
        };

        let mut round_tools: Vec<ToolCall> = Vec::new();
        let mut stop_reason = String::new();
        let mut stream_error: Option<String> = None;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => None,
                ev = ev_rx.recv() => ev,
            };
            if cancel.is_cancelled() {
                break;
            }
            let Some(event) = event else { break };

            match event {
                StreamEvent::TextDelta { text } => {
                    outcome.full_text.push_str(&text);
                    next_text_index += 1;
                    if let Some((idx, prev)) = pending.replace((next_text_index, text.clone())) {
                        let chunk = TurnEvent::Text(TextChunk {
                            turn_id: turn_id.clone(),
                            sequence_index: idx,
                            text: prev,
                            is_final: false,
                        });
                        if !send_or_cancel(&events, &cancel, chunk).await {
                            cancel.cancel();
                            break;
                        }
                        outcome.text_chunks = idx;
                    }
                    if let Some(lane) = &audio {
                        buffer.push(&text);
                        for sentence in buffer.drain_sentences() {
                            // Bounded queue: this send pauses the producer
                            // when TTS lags. No token is ever dropped.
                            if !send_or_cancel(&lane.queue, &cancel, Some(sentence)).await {
                                break;
                            }
                        }
                    }
                    tokio::task::yield_now().await;
                }
                StreamEvent::ToolUse { id, name, input } => {
                    round_tools.push(ToolCall { id, name, input });
                }
                StreamEvent::Done {
                    model,
                    tokens_in,
                    tokens_out,
                    stop_reason: reason,
                } => {
                    outcome.model = Some(model);
                    outcome.tokens_in = tokens_in;
                    outcome.tokens_out += tokens_out;
                    stop_reason = reason;
                    break;
                }
                StreamEvent::Error { message } => {
                    stream_error = Some(message);
                    break;
                }
            }
        }

        // Surface transport-level failures from the provider task itself.
        match llm_call.await {
            Ok(Ok(())) => {}
            Ok(Err(ProviderError::Cancelled)) => {}
            Ok(Err(e)) if stream_error.is_none() && !cancel.is_cancelled() => {
                break Err(e);
            }
            Ok(Err(_)) => {}
            Err(_) => {
                break Err(ProviderError::Unavailable("LLM task panicked".into()));
            }
        }

        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break Ok(());
        }
        if let Some(message) = stream_error {
            break Err(ProviderError::Unavailable(message));
        }

        let run_tools = stop_reason == "tool_use" && !round_tools.is_empty();
        if !run_tools || rounds >= MAX_TOOL_ROUNDS {
            if run_tools {
                warn!(rounds, "tool round limit reached, ending turn");
            }
            break Ok(());
        }

        let Some(ctx) = &tools else {
            warn!("model requested tools but no tool context is wired");
            break Ok(());
        };
        for call in round_tools {
            let result = dispatch(ctx, &call).await;
            request.messages.push(ChatMessage::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
            request.messages.push(ChatMessage::ToolResult {
                id: call.id,
                content: result,
            });
        }
    };

    match result {
        Ok(()) if !outcome.cancelled => {
            // Emit the held-back last chunk as the final one.
            if let Some((idx, text)) = pending.take() {
                outcome.text_chunks = idx;
                let _ = events
                    .send(TurnEvent::Text(TextChunk {
                        turn_id: turn_id.clone(),
                        sequence_index: idx,
                        text,
                        is_final: true,
                    }))
                    .await;
            }
            // Graceful audio shutdown: residue, sentinel, then wait.
            if let Some(lane) = audio.take() {
                if let Some(residue) = buffer.flush() {
                    let _ = lane.queue.send(Some(residue)).await;
                }
                let _ = lane.queue.send(None).await;
                drop(lane.queue);
                if let Ok(report) = lane.worker.await {
                    outcome.audio_chunks = report.frames_emitted;
                }
            }
            Ok(outcome)
        }
        Ok(()) => {
            // Cancelled: hard stop. Closing the queue without a sentinel
            // makes the worker exit without emitting a final marker.
            if let Some(lane) = audio.take() {
                drop(lane.queue);
                if let Ok(report) = lane.worker.await {
                    outcome.audio_chunks = report.frames_emitted;
                }
            }
            Ok(outcome)
        }
        Err(e) => {
            // Upstream failure: cut both modalities at the next emission
            // point. The caller turns this into a terminal error frame.
            if let Some(lane) = audio.take() {
                drop(lane.queue);
                if let Ok(report) = lane.worker.await {
                    outcome.audio_chunks = report.frames_emitted;
                }
            }
            Err(e)
        }
    }
}

/// Synthesize a single utterance (reflex replies) through the same
/// worker path: one sentence, sentinel, ordered frames, final marker.
pub async fn synthesize_single(
    tts: Arc<dyn TtsClient>,
    voice_id: String,
    turn_id: TurnId,
    text: &str,
    events: mpsc::Sender<TurnEvent>,
    cancel: CancellationToken,
) -> u64 {
    let (queue_tx, queue_rx) = mpsc::channel::<Option<String>>(SENTENCE_QUEUE_CAPACITY);
    let worker = tokio::spawn(run_tts_worker(
        tts,
        voice_id,
        turn_id,
        queue_rx,
        events,
        cancel,
    ));
    let _ = queue_tx.send(Some(text.to_string())).await;
    let _ = queue_tx.send(None).await;
    drop(queue_tx);
    worker.await.map(|r| r.frames_emitted).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::{MockLlm, MockRound, MockTts};
    use crate::turn::TurnEvent;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "mock-model".to_string(),
            system: "persona".to_string(),
            messages: vec![ChatMessage::User {
                content: "tell me a joke".to_string(),
            }],
            temperature: 0.7,
            max_tokens: 256,
            tools: Vec::new(),
        }
    }

    async fn drain(ev_rx: &mut mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = ev_rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn text_indices_are_contiguous_and_final_is_last_content_chunk() {
        let tokens = ["Why", "did", " the", " chicken", " cross", " the", " road", "?"];
        let llm = Arc::new(MockLlm::with_tokens(&tokens));
        let (ev_tx, mut ev_rx) = mpsc::channel(256);

        let outcome = run_streaming_turn(
            llm,
            None,
            request(),
            String::new(),
            TurnId::new(),
            None,
            ev_tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let events = drain(&mut ev_rx).await;
        let chunks: Vec<&TextChunk> = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Text(c) => Some(c),
                _ => None,
            })
            .collect();

        assert_eq!(chunks.len(), 8);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence_index, (i + 1) as u64);
            assert_eq!(c.is_final, i == chunks.len() - 1);
        }
        assert_eq!(chunks.last().unwrap().text, "?");
        assert_eq!(outcome.full_text, tokens.concat());
        assert_eq!(outcome.text_chunks, 8);
        assert_eq!(outcome.audio_chunks, 0);
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn back_pressure_drops_no_tokens() {
        // Many short sentences against a slow TTS: the bounded queue
        // pauses the producer, yet every token must surface as text.
        let mut tokens = Vec::new();
        for i in 0..40 {
            tokens.push(format!("word{i}. "));
        }
        let token_refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let llm = Arc::new(MockLlm::with_tokens(&token_refs));
        let tts = Arc::new(MockTts::new(400, 3).delayed(Duration::from_millis(2)));
        let (ev_tx, mut ev_rx) = mpsc::channel(4096);

        let outcome = run_streaming_turn(
            llm,
            Some(tts),
            request(),
            "voice".to_string(),
            TurnId::new(),
            None,
            ev_tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let events = drain(&mut ev_rx).await;
        let mut concatenated = String::new();
        for e in &events {
            if let TurnEvent::Text(c) = e {
                concatenated.push_str(&c.text);
            }
        }
        assert_eq!(concatenated, outcome.full_text);
        assert_eq!(outcome.full_text, tokens.concat());
        assert!(outcome.audio_chunks > 0);

        // Audio frames are strictly ordered with one trailing final marker.
        let frames: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Audio(f) => Some(f),
                _ => None,
            })
            .collect();
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(f.sequence_index, (i + 1) as u64);
        }
        assert!(frames.last().unwrap().is_final);
    }

    #[tokio::test]
    async fn cancellation_before_first_token_emits_nothing() {
        let llm = Arc::new(MockLlm::with_tokens(&["never"]).delayed(Duration::from_secs(5)));
        let tts = Arc::new(MockTts::new(512, 2));
        let (ev_tx, mut ev_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run_streaming_turn(
            llm,
            Some(tts),
            request(),
            "voice".to_string(),
            TurnId::new(),
            None,
            ev_tx,
            cancel,
        )
        .await
        .unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.text_chunks, 0);
        assert_eq!(outcome.audio_chunks, 0);
        let events = drain(&mut ev_rx).await;
        assert!(events
            .iter()
            .all(|e| !matches!(e, TurnEvent::Text(_) | TurnEvent::Audio(_))));
    }

    #[tokio::test]
    async fn provider_error_surfaces_as_err() {
        let llm = Arc::new(MockLlm::failing("model fell over"));
        let (ev_tx, mut ev_rx) = mpsc::channel(64);

        let result = run_streaming_turn(
            llm,
            None,
            request(),
            String::new(),
            TurnId::new(),
            None,
            ev_tx,
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_err());
        let events = drain(&mut ev_rx).await;
        assert!(events.iter().all(|e| !matches!(e, TurnEvent::Text(_))));
    }

    #[tokio::test]
    async fn tts_failure_does_not_stop_text() {
        let llm = Arc::new(MockLlm::with_tokens(&["First sentence. ", "Second bit."]));
        let tts = Arc::new(MockTts::new(512, 2).failing());
        let (ev_tx, mut ev_rx) = mpsc::channel(256);

        let outcome = run_streaming_turn(
            llm,
            Some(tts),
            request(),
            "voice".to_string(),
            TurnId::new(),
            None,
            ev_tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.full_text, "First sentence. Second bit.");
        let events = drain(&mut ev_rx).await;
        let text_count = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::Text(_)))
            .count();
        assert_eq!(text_count, 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, TurnEvent::AudioError { .. })));
        assert_eq!(outcome.audio_chunks, 0);
    }

    #[tokio::test]
    async fn tool_round_feeds_results_back_and_streams_final_text() {
        use banter_memory::memory::InMemoryMemoryStore;

        let store = Arc::new(InMemoryMemoryStore::new());
        banter_memory::tools::save_memory(store.as_ref(), "likes pizza", "u1")
            .await
            .unwrap();

        let llm = Arc::new(MockLlm::with_rounds(vec![
            MockRound::tool_call("search_memory", serde_json::json!({"query": "food"})),
            MockRound::text(&["You", " like", " pizza."]),
        ]));
        let (ev_tx, mut ev_rx) = mpsc::channel(256);

        let outcome = run_streaming_turn(
            llm,
            None,
            request(),
            String::new(),
            TurnId::new(),
            Some(ToolContext {
                memory: store,
                user_id: "u1".to_string(),
            }),
            ev_tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.full_text, "You like pizza.");
        let events = drain(&mut ev_rx).await;
        let chunks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Text(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.last().unwrap().is_final);
    }
}
