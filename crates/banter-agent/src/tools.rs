//! Memory tools exposed to the cognition path. The pipeline dispatches
//! mid-turn tool calls here; everything stays inside the calling user's
//! namespace.

use std::sync::Arc;

use tracing::{debug, warn};

use banter_memory::store::MemoryStore;
use banter_memory::tools::{save_memory, search_memory};

use crate::provider::{ToolCall, ToolDefinition};

/// Context the tool dispatcher needs: the store and the user the turn
/// belongs to.
#[derive(Clone)]
pub struct ToolContext {
    pub memory: Arc<dyn MemoryStore>,
    pub user_id: String,
}

/// Definitions advertised to the LLM for every cognition turn.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "search_memory".to_string(),
            description: "Search long-term memory for relevant user information.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "What to look for" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "save_memory".to_string(),
            description: "Save important information to long-term memory.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "The fact to remember" }
                },
                "required": ["content"]
            }),
        },
    ]
}

/// Execute one tool call. Unknown tools and store failures return an
/// error string to the model rather than failing the turn.
pub async fn dispatch(ctx: &ToolContext, call: &ToolCall) -> String {
    debug!(tool = %call.name, user = %ctx.user_id, "dispatching tool call");
    match call.name.as_str() {
        "search_memory" => {
            let query = call
                .input
                .get("query")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            match search_memory(ctx.memory.as_ref(), query, &ctx.user_id).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "search_memory failed");
                    format!("memory search failed: {e}")
                }
            }
        }
        "save_memory" => {
            let content = call
                .input
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            match save_memory(ctx.memory.as_ref(), content, &ctx.user_id).await {
                Ok(ack) => ack,
                Err(e) => {
                    warn!(error = %e, "save_memory failed");
                    format!("memory save failed: {e}")
                }
            }
        }
        other => format!("unknown tool: {other}"),
    }
}
