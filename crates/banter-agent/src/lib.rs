//! The turn engine: provider clients (LLM, TTS), the dual-system
//! orchestrator (reflex + cognition), and the streaming pipeline that
//! turns an LLM token stream into ordered text and audio frames.

pub mod anthropic;
pub mod elevenlabs;
pub mod emotion;
pub mod openai;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod reflex;
pub mod stream;
pub mod summarize;
pub mod testing;
pub mod tools;
pub mod turn;

pub use orchestrator::{Orchestrator, TurnRequest};
pub use provider::{ChatMessage, ChatRequest, Completion, LlmClient, ProviderError, TtsClient};
pub use turn::{AudioFrame, TextChunk, TurnEvent, TurnMetadata, TurnPath};
