use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::{
    namespace_matches_prefix, value_matches_filter, MemoryItem, SearchQuery,
};

/// In-memory memory store for development and tests.
///
/// Items are grouped by namespace tuple; the single mutex serializes all
/// writes, which trivially satisfies per-namespace serialization.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    items: Mutex<HashMap<Vec<String>, HashMap<String, MemoryItem>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn put(&self, namespace: &[String], key: &str, value: serde_json::Value) -> Result<()> {
        let mut items = self.items.lock().unwrap();
        let ns_items = items.entry(namespace.to_vec()).or_default();
        let mut item = MemoryItem::new(namespace.to_vec(), key, value);
        if let Some(existing) = ns_items.get(key) {
            // Replacement keeps the original creation time.
            item.created_at = existing.created_at.clone();
        }
        debug!(namespace = ?namespace, key, "stored memory item");
        ns_items.insert(key.to_string(), item);
        Ok(())
    }

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<MemoryItem>> {
        let items = self.items.lock().unwrap();
        Ok(items
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryItem>> {
        let items = self.items.lock().unwrap();
        let mut found: Vec<MemoryItem> = items
            .iter()
            .filter(|(ns, _)| namespace_matches_prefix(ns, &query.namespace))
            .flat_map(|(_, ns_items)| ns_items.values().cloned())
            .filter(|item| match &query.filter {
                Some(filter) => value_matches_filter(&item.value, filter),
                None => true,
            })
            .collect();
        // Newest first, so the limit keeps the most recent entries.
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        found.truncate(query.limit);
        Ok(found)
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<bool> {
        let mut items = self.items.lock().unwrap();
        Ok(items
            .get_mut(namespace)
            .map(|ns| ns.remove(key).is_some())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = InMemoryMemoryStore::new();
        store
            .put(&ns(&["memories", "u1"]), "k1", serde_json::json!({"data": "likes pizza"}))
            .await
            .unwrap();
        let item = store.get(&ns(&["memories", "u1"]), "k1").await.unwrap().unwrap();
        assert_eq!(item.value["data"], "likes pizza");
    }

    #[tokio::test]
    async fn replacement_preserves_created_at() {
        let store = InMemoryMemoryStore::new();
        let namespace = ns(&["memories", "u1"]);
        store
            .put(&namespace, "k1", serde_json::json!({"data": "v1"}))
            .await
            .unwrap();
        let first = store.get(&namespace, "k1").await.unwrap().unwrap();
        store
            .put(&namespace, "k1", serde_json::json!({"data": "v2"}))
            .await
            .unwrap();
        let second = store.get(&namespace, "k1").await.unwrap().unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.value["data"], "v2");
    }

    #[tokio::test]
    async fn search_respects_namespace_isolation() {
        let store = InMemoryMemoryStore::new();
        store
            .put(&ns(&["memories", "a"]), "k", serde_json::json!({"data": "likes pizza"}))
            .await
            .unwrap();

        let hits = store
            .search(&SearchQuery::in_namespace(ns(&["memories", "a"]), 5))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store
            .search(&SearchQuery::in_namespace(ns(&["memories", "b"]), 5))
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn search_covers_nested_namespaces() {
        let store = InMemoryMemoryStore::new();
        store
            .put(&ns(&["memories", "a", "work"]), "k", serde_json::json!({"data": "x"}))
            .await
            .unwrap();
        let hits = store
            .search(&SearchQuery::in_namespace(ns(&["memories", "a"]), 5))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn search_applies_equality_filter_and_limit() {
        let store = InMemoryMemoryStore::new();
        let namespace = ns(&["memories", "a"]);
        for i in 0..10 {
            store
                .put(
                    &namespace,
                    &format!("k{i}"),
                    serde_json::json!({"data": format!("v{i}"), "kind": if i % 2 == 0 { "even" } else { "odd" }}),
                )
                .await
                .unwrap();
        }
        let mut filter = serde_json::Map::new();
        filter.insert("kind".into(), serde_json::json!("even"));
        let hits = store
            .search(&SearchQuery {
                namespace,
                filter: Some(filter),
                limit: 3,
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|i| i.value["kind"] == "even"));
    }
}
