//! The two memory tools exposed to the cognition path. Both operate
//! strictly inside the `("memories", user_id)` namespace.

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::SearchQuery;

/// Maximum items returned by one `search_memory` call.
pub const SEARCH_LIMIT: usize = 5;
/// Returned when the user has no stored memories matching the search.
pub const NO_MEMORIES: &str = "No relevant memories found.";

fn user_namespace(user_id: &str) -> Vec<String> {
    vec!["memories".to_string(), user_id.to_string()]
}

/// Search long-term memory for relevant user information.
///
/// Returns up to [`SEARCH_LIMIT`] entries, newline-separated, or the
/// [`NO_MEMORIES`] sentinel when nothing is stored.
pub async fn search_memory(store: &dyn MemoryStore, _query: &str, user_id: &str) -> Result<String> {
    let items = store
        .search(&SearchQuery::in_namespace(user_namespace(user_id), SEARCH_LIMIT))
        .await?;

    if items.is_empty() {
        return Ok(NO_MEMORIES.to_string());
    }

    let entries: Vec<String> = items
        .iter()
        .map(|item| {
            item.value
                .get("data")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        })
        .collect();
    Ok(entries.join("\n"))
}

/// Save important information to long-term memory under a fresh key.
pub async fn save_memory(store: &dyn MemoryStore, content: &str, user_id: &str) -> Result<String> {
    let namespace = user_namespace(user_id);
    let key = Uuid::new_v4().to_string();
    store
        .put(&namespace, &key, serde_json::json!({ "data": content }))
        .await?;
    debug!(user_id, key = %key, "saved memory");
    Ok(format!("Saved: {content}"))
}
