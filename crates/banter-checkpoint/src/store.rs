use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Checkpoint, CheckpointMessage};

/// Store contract for conversation checkpoints.
///
/// `append` is serialized per thread id by every backend — two turns on
/// the same thread never interleave their history writes.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a thread, if any exists.
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Append one message to the thread, creating the checkpoint on first use.
    async fn append(&self, thread_id: &str, message: CheckpointMessage) -> Result<()>;

    /// Replace the full checkpoint body (summarization uses this).
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Drop all state for a thread.
    async fn delete(&self, thread_id: &str) -> Result<()>;
}
