use serde::{Deserialize, Serialize};

/// Separator used when a namespace tuple is flattened to one string
/// (SQLite column, in-memory map key). Namespace components must not
/// contain it.
pub const NAMESPACE_SEPARATOR: char = '/';

/// One stored memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Hierarchical namespace, e.g. `["memories", "user-42"]`.
    pub namespace: Vec<String>,
    pub key: String,
    /// Opaque record; tools store `{"data": "..."}`.
    pub value: serde_json::Value,
    /// RFC3339; preserved across replacement of the same (namespace, key).
    pub created_at: String,
    /// RFC3339; advances on every write.
    pub updated_at: String,
}

impl MemoryItem {
    pub fn new(namespace: Vec<String>, key: impl Into<String>, value: serde_json::Value) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            namespace,
            key: key.into(),
            value,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Search parameters: a namespace prefix, an optional equality filter over
/// value fields, and a result limit.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub namespace: Vec<String>,
    pub filter: Option<serde_json::Map<String, serde_json::Value>>,
    pub limit: usize,
}

impl SearchQuery {
    pub fn in_namespace(namespace: Vec<String>, limit: usize) -> Self {
        Self {
            namespace,
            filter: None,
            limit,
        }
    }
}

/// Flatten a namespace tuple into its storage form.
pub fn join_namespace(namespace: &[String]) -> String {
    namespace.join(&NAMESPACE_SEPARATOR.to_string())
}

/// Split a flattened namespace back into its tuple form.
pub fn split_namespace(joined: &str) -> Vec<String> {
    joined
        .split(NAMESPACE_SEPARATOR)
        .map(str::to_string)
        .collect()
}

/// True when `item_ns` equals `prefix` or extends it by whole components.
/// `["memories", "a"]` matches prefix `["memories"]` but `["memories2"]`
/// does not.
pub fn namespace_matches_prefix(item_ns: &[String], prefix: &[String]) -> bool {
    item_ns.len() >= prefix.len() && item_ns[..prefix.len()] == *prefix
}

/// Equality match of `filter` fields against a value object.
pub fn value_matches_filter(
    value: &serde_json::Value,
    filter: &serde_json::Map<String, serde_json::Value>,
) -> bool {
    filter
        .iter()
        .all(|(k, expected)| value.get(k) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_split_roundtrip() {
        let ns = vec!["memories".to_string(), "u1".to_string()];
        assert_eq!(split_namespace(&join_namespace(&ns)), ns);
    }

    #[test]
    fn prefix_matching_is_component_wise() {
        let ns = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(namespace_matches_prefix(
            &ns(&["memories", "u1"]),
            &ns(&["memories"])
        ));
        assert!(namespace_matches_prefix(
            &ns(&["memories", "u1"]),
            &ns(&["memories", "u1"])
        ));
        assert!(!namespace_matches_prefix(
            &ns(&["memories2"]),
            &ns(&["memories"])
        ));
        assert!(!namespace_matches_prefix(
            &ns(&["memories", "u1"]),
            &ns(&["memories", "u2"])
        ));
    }

    #[test]
    fn filter_matches_on_equality() {
        let value = serde_json::json!({"data": "pizza", "kind": "food"});
        let mut filter = serde_json::Map::new();
        filter.insert("kind".into(), serde_json::json!("food"));
        assert!(value_matches_filter(&value, &filter));
        filter.insert("kind".into(), serde_json::json!("drink"));
        assert!(!value_matches_filter(&value, &filter));
    }
}
