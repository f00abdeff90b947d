use base64::Engine;
use tokio::sync::mpsc;

use banter_agent::turn::{TurnEvent, TurnPath};

use crate::ws::message::ServerMessage;

/// Outbound frame queue for one connection. The connection owns the
/// socket; everything else (turn tasks, the ping handler) enqueues
/// serialized frames here, which preserves per-connection ordering.
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<String>,
}

impl FrameSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Serialize and enqueue one frame. Returns false when the
    /// connection is gone.
    pub async fn send(&self, frame: &ServerMessage) -> bool {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(_) => return true,
        };
        self.tx.send(json).await.is_ok()
    }

    pub async fn send_pong(&self) -> bool {
        self.send(&ServerMessage::Pong {
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
        .await
    }

    pub async fn send_error(&self, code: &str, message: &str) -> bool {
        self.send(&ServerMessage::Error {
            code: code.to_string(),
            message: message.to_string(),
        })
        .await
    }
}

/// Map a turn event onto its wire frame.
pub fn frame_for_event(event: &TurnEvent) -> ServerMessage {
    match event {
        TurnEvent::Text(chunk) => ServerMessage::TextChunk {
            chunk: chunk.text.clone(),
            chunk_index: chunk.sequence_index,
            is_final: chunk.is_final,
        },
        TurnEvent::Audio(frame) => ServerMessage::AudioChunk {
            data: base64::engine::general_purpose::STANDARD.encode(&frame.payload),
            chunk_index: frame.sequence_index,
            is_final: frame.is_final,
            size_bytes: frame.payload.len(),
        },
        TurnEvent::AudioError { message } => ServerMessage::Error {
            code: "TTS_ERROR".to_string(),
            message: message.clone(),
        },
        TurnEvent::Metadata(meta) => ServerMessage::Metadata {
            path: match meta.path {
                TurnPath::Reflex => "reflex".to_string(),
                TurnPath::Cognition => "cognition".to_string(),
            },
            emotion: meta.emotion.to_string(),
            model: meta.model.clone(),
            tokens_in: meta.tokens_in,
            tokens_out: meta.tokens_out,
            execution_time_ms: meta.execution_time_ms,
            text_chunks: meta.text_chunks,
            audio_chunks: meta.audio_chunks,
        },
        TurnEvent::Completed => ServerMessage::Complete {
            message: "Stream completed successfully".to_string(),
        },
        TurnEvent::Interrupted {
            at_text_chunk,
            at_audio_chunk,
        } => ServerMessage::Interrupted {
            reason: "new_message".to_string(),
            interrupted_at_text_chunk: *at_text_chunk,
            interrupted_at_audio_chunk: *at_audio_chunk,
        },
        TurnEvent::Error { code, message } => ServerMessage::Error {
            code: (*code).to_string(),
            message: message.clone(),
        },
    }
}
