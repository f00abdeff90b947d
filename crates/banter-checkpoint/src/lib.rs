//! Conversation checkpoints: per-thread message history with an optional
//! rolling summary, behind one store contract with in-memory and SQLite
//! backends. The cognition path reconstructs context from here.

pub mod db;
pub mod error;
pub mod memory;
pub mod store;
pub mod thread;
pub mod types;

pub use error::{CheckpointError, Result};
pub use store::CheckpointStore;
pub use thread::resolve_thread_id;
pub use types::{Checkpoint, CheckpointMessage};
