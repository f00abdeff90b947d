//! WebSocket chat surface wire types: one JSON message per inbound
//! frame, a typed sequence outbound.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Inbound client frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    ChatRequest {
        #[serde(default)]
        user_id: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        configuration: Option<Configuration>,
        #[serde(default)]
        context: Option<Context>,
        #[serde(default)]
        stream_audio: bool,
        #[serde(default)]
        voice_id: Option<String>,
    },
}

/// Per-request model overrides.
#[derive(Debug, Default, Deserialize)]
pub struct Configuration {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Request context: tenant scoping, explicit thread override, display
/// name, and optional audio features for emotion detection.
#[derive(Debug, Default, Deserialize)]
pub struct Context {
    pub tenant_id: Option<String>,
    pub session_id: Option<String>,
    pub user_name: Option<String>,
    pub audio_features: Option<HashMap<String, f64>>,
}

/// Outbound server frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong {
        timestamp: String,
    },
    TextChunk {
        chunk: String,
        chunk_index: u64,
        is_final: bool,
    },
    AudioChunk {
        /// Base64-encoded audio payload.
        data: String,
        chunk_index: u64,
        is_final: bool,
        size_bytes: usize,
    },
    Metadata {
        path: String,
        emotion: String,
        model: Option<String>,
        tokens_in: u32,
        tokens_out: u32,
        execution_time_ms: u64,
        text_chunks: u64,
        audio_chunks: u64,
    },
    Complete {
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
    Interrupted {
        reason: String,
        interrupted_at_text_chunk: u64,
        interrupted_at_audio_chunk: u64,
    },
}
