use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::{ChatMessage, ChatRequest, Completion, LlmClient, ProviderError};
use crate::stream::{SseLineBuffer, StreamEvent};

/// OpenAI chat-completions client (also serves OpenAI-compatible
/// endpoints via `base_url`).
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// `timeout_secs` bounds the whole call, not individual tokens.
    pub fn new(api_key: String, base_url: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    async fn post(&self, body: serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let resp = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI API error");
            return Err(ProviderError::from_status(status, text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, req: &ChatRequest) -> Result<Completion, ProviderError> {
        debug!(model = %req.model, "openai completion request");
        let resp = self.post(build_body(req, false)).await?;
        let api: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("response has no choices".into()))?;

        Ok(Completion {
            content: choice.message.and_then(|m| m.content).unwrap_or_default(),
            model: api.model,
            tokens_in: api.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
            tokens_out: api
                .usage
                .as_ref()
                .map(|u| u.completion_tokens)
                .unwrap_or(0),
            stop_reason: normalize_finish(choice.finish_reason.as_deref()),
        })
    }

    async fn stream_chat(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        debug!(model = %req.model, "openai streaming request");
        let resp = self.post(build_body(req, true)).await?;
        process_openai_stream(resp, req.model.clone(), tx, cancel).await;
        Ok(())
    }
}

fn build_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": req.system,
    })];
    for m in &req.messages {
        messages.push(match m {
            ChatMessage::System { content } => {
                serde_json::json!({"role": "system", "content": content})
            }
            ChatMessage::User { content } => {
                serde_json::json!({"role": "user", "content": content})
            }
            ChatMessage::Assistant { content } => {
                serde_json::json!({"role": "assistant", "content": content})
            }
            ChatMessage::ToolUse { id, name, input } => serde_json::json!({
                "role": "assistant",
                "content": serde_json::Value::Null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": input.to_string(),
                    },
                }],
            }),
            ChatMessage::ToolResult { id, content } => serde_json::json!({
                "role": "tool",
                "tool_call_id": id,
                "content": content,
            }),
        });
    }

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "temperature": req.temperature,
        "max_tokens": req.max_tokens,
        "stream": stream,
    });
    if stream {
        body["stream_options"] = serde_json::json!({ "include_usage": true });
    }
    if !req.tools.is_empty() {
        body["tools"] = serde_json::Value::Array(
            req.tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        },
                    })
                })
                .collect(),
        );
    }
    body
}

/// OpenAI reports "tool_calls"/"stop"; normalize to the Anthropic-style
/// names the tool loop matches on.
fn normalize_finish(reason: Option<&str>) -> String {
    match reason {
        Some("tool_calls") => "tool_use".to_string(),
        Some("stop") | None => "end_turn".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Drain an OpenAI SSE response and forward events through `tx`.
/// Honors `cancel` between every network chunk.
async fn process_openai_stream(
    resp: reqwest::Response,
    fallback_model: String,
    tx: mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) {
    let mut byte_stream = resp.bytes_stream();
    let mut lines = SseLineBuffer::new();

    let mut model = fallback_model;
    let mut tokens_in = 0u32;
    let mut tokens_out = 0u32;
    let mut finish_reason: Option<String> = None;
    // Partial tool calls accumulate per choice index until [DONE].
    let mut partial_tools: BTreeMap<u32, PartialToolCall> = BTreeMap::new();

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return,
            chunk = byte_stream.next() => chunk,
        };

        let chunk = match chunk {
            Some(Ok(c)) => c,
            Some(Err(e)) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
            None => break,
        };

        let Ok(text) = std::str::from_utf8(&chunk) else {
            continue;
        };

        for line in lines.push(text) {
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            if data == "[DONE]" {
                continue;
            }
            let Ok(delta) = serde_json::from_str::<StreamChunk>(data) else {
                debug!(line = %data, "unparseable stream chunk, skipping");
                continue;
            };

            if !delta.model.is_empty() {
                model = delta.model;
            }
            if let Some(usage) = delta.usage {
                tokens_in = usage.prompt_tokens;
                tokens_out = usage.completion_tokens;
            }
            let Some(choice) = delta.choices.into_iter().next() else {
                continue;
            };
            if let Some(reason) = choice.finish_reason {
                finish_reason = Some(reason);
            }
            let Some(d) = choice.delta else { continue };
            if let Some(content) = d.content {
                if !content.is_empty() && tx.send(StreamEvent::TextDelta { text: content }).await.is_err()
                {
                    return; // receiver dropped
                }
            }
            for tc in d.tool_calls.unwrap_or_default() {
                let slot = partial_tools.entry(tc.index).or_default();
                if let Some(id) = tc.id {
                    slot.id = id;
                }
                if let Some(f) = tc.function {
                    if let Some(name) = f.name {
                        slot.name = name;
                    }
                    if let Some(args) = f.arguments {
                        slot.arguments.push_str(&args);
                    }
                }
            }
        }
    }

    // Flush accumulated tool calls before the terminal Done.
    for (_, partial) in partial_tools {
        let input = serde_json::from_str(&partial.arguments)
            .unwrap_or(serde_json::Value::Object(Default::default()));
        if tx
            .send(StreamEvent::ToolUse {
                id: partial.id,
                name: partial.name,
                input,
            })
            .await
            .is_err()
        {
            return;
        }
    }

    let _ = tx
        .send(StreamEvent::Done {
            model,
            tokens_in,
            tokens_out,
            stop_reason: normalize_finish(finish_reason.as_deref()),
        })
        .await;
}

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

// OpenAI wire types (deserialization only).

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: Option<ApiMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<StreamToolFunction>,
}

#[derive(Deserialize)]
struct StreamToolFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ToolDefinition;

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            system: "be brief".to_string(),
            messages: vec![ChatMessage::User {
                content: "hi".to_string(),
            }],
            temperature: 0.7,
            max_tokens: 128,
            tools: Vec::new(),
        }
    }

    #[test]
    fn body_places_system_first() {
        let body = build_body(&request(), false);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn tool_messages_map_to_openai_shapes() {
        let mut req = request();
        req.messages.push(ChatMessage::ToolUse {
            id: "call_1".into(),
            name: "search_memory".into(),
            input: serde_json::json!({"query": "pizza"}),
        });
        req.messages.push(ChatMessage::ToolResult {
            id: "call_1".into(),
            content: "likes pizza".into(),
        });
        let body = build_body(&req, false);
        let messages = body["messages"].as_array().unwrap();
        let tool_use = &messages[2];
        assert_eq!(tool_use["tool_calls"][0]["function"]["name"], "search_memory");
        let tool_result = &messages[3];
        assert_eq!(tool_result["role"], "tool");
        assert_eq!(tool_result["tool_call_id"], "call_1");
    }

    #[test]
    fn tools_are_advertised_as_functions() {
        let mut req = request();
        req.tools.push(ToolDefinition {
            name: "save_memory".into(),
            description: "save".into(),
            input_schema: serde_json::json!({"type": "object"}),
        });
        let body = build_body(&req, true);
        assert_eq!(body["tools"][0]["function"]["name"], "save_memory");
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn finish_reasons_normalize() {
        assert_eq!(normalize_finish(Some("tool_calls")), "tool_use");
        assert_eq!(normalize_finish(Some("stop")), "end_turn");
        assert_eq!(normalize_finish(None), "end_turn");
        assert_eq!(normalize_finish(Some("length")), "length");
    }
}
