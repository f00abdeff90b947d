use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::store::CheckpointStore;
use crate::types::{Checkpoint, CheckpointMessage};

/// In-memory checkpoint store.
///
/// Each thread's checkpoint lives under its own `DashMap` entry, so
/// `append` holds that entry's shard lock for the duration of the write
/// — per-thread serialization for free.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    by_thread: DashMap<String, Checkpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.by_thread.get(thread_id).map(|c| c.value().clone()))
    }

    async fn append(&self, thread_id: &str, message: CheckpointMessage) -> Result<()> {
        self.by_thread
            .entry(thread_id.to_string())
            .or_insert_with(|| Checkpoint::new(thread_id))
            .push(message);
        Ok(())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.by_thread
            .insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> Result<()> {
        self.by_thread.remove(thread_id);
        Ok(())
    }
}
