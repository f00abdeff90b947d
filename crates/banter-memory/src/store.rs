use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MemoryItem, SearchQuery};

/// Store contract for namespaced memory records.
///
/// Backends serialize writes per namespace. Replacing an existing
/// (namespace, key) preserves `created_at` and advances `updated_at`.
/// `search` is a namespace *prefix* search: it returns items from the
/// query namespace and every namespace nested under it, up to `limit`.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn put(&self, namespace: &[String], key: &str, value: serde_json::Value) -> Result<()>;

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<MemoryItem>>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryItem>>;

    /// Returns true when an item was actually removed.
    async fn delete(&self, namespace: &[String], key: &str) -> Result<bool>;
}
