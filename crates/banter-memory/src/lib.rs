//! Long-term user memory: a namespaced key-value store with prefix
//! search, plus the two tools (`search_memory`, `save_memory`) the
//! cognition path may invoke mid-turn. Namespaces isolate users — a
//! query never crosses its `("memories", user_id)` prefix.

pub mod db;
pub mod error;
pub mod memory;
pub mod store;
pub mod tools;
pub mod types;

pub use error::{MemoryError, Result};
pub use store::MemoryStore;
pub use types::{MemoryItem, SearchQuery};
