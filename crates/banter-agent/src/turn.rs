use serde::Serialize;

use banter_core::types::{Emotion, TurnId};

/// Which half of the dual system produced the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPath {
    Reflex,
    Cognition,
}

/// One ordered text chunk of a turn. `sequence_index` starts at 1 and is
/// strictly increasing per turn; exactly one chunk carries `is_final`
/// (the last one, with its content).
#[derive(Debug, Clone, Serialize)]
pub struct TextChunk {
    pub turn_id: TurnId,
    pub sequence_index: u64,
    pub text: String,
    pub is_final: bool,
}

/// One ordered audio frame of a turn. Sequence space is independent of
/// the text chunks. The terminal frame is an empty-payload marker at
/// `last + 1`.
#[derive(Debug, Clone, Serialize)]
pub struct AudioFrame {
    pub turn_id: TurnId,
    pub sequence_index: u64,
    pub payload: Vec<u8>,
    pub is_final: bool,
}

/// Summary of a finished turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnMetadata {
    pub turn_id: TurnId,
    pub path: TurnPath,
    pub emotion: Emotion,
    pub model: Option<String>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub execution_time_ms: u64,
    pub text_chunks: u64,
    pub audio_chunks: u64,
}

/// Event stream produced by one turn.
///
/// Within each modality, indices are strictly increasing; across
/// modalities there is no total order. A turn ends with exactly one of
/// `Completed`, `Interrupted`, or `Error`.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    Text(TextChunk),
    Audio(AudioFrame),
    /// Non-fatal audio-side failure: text continues, audio has ended.
    AudioError { message: String },
    Metadata(TurnMetadata),
    Completed,
    Interrupted {
        at_text_chunk: u64,
        at_audio_chunk: u64,
    },
    Error {
        code: &'static str,
        message: String,
    },
}
