use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::{ChatMessage, ChatRequest, Completion, LlmClient, ProviderError};
use crate::stream::{parse_sse_line, SseLineBuffer, SseParsed, StreamEvent};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// `timeout_secs` bounds the whole call, not individual tokens.
    pub fn new(api_key: String, base_url: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic API error");
            return Err(ProviderError::from_status(status, text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, req: &ChatRequest) -> Result<Completion, ProviderError> {
        debug!(model = %req.model, "anthropic completion request");
        let resp = self.post(build_body(req, false)).await?;
        let api: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content = api
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            content,
            model: api.model,
            tokens_in: api.usage.input_tokens,
            tokens_out: api.usage.output_tokens,
            stop_reason: api.stop_reason.unwrap_or_else(|| "end_turn".to_string()),
        })
    }

    async fn stream_chat(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        debug!(model = %req.model, "anthropic streaming request");
        let resp = self.post(build_body(req, true)).await?;
        process_anthropic_stream(resp, tx, cancel).await;
        Ok(())
    }
}

fn build_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| match m {
            // Anthropic has no system role inside messages; fold extra
            // system content into a user turn (rare in practice).
            ChatMessage::System { content } | ChatMessage::User { content } => {
                serde_json::json!({"role": "user", "content": content})
            }
            ChatMessage::Assistant { content } => {
                serde_json::json!({"role": "assistant", "content": content})
            }
            ChatMessage::ToolUse { id, name, input } => serde_json::json!({
                "role": "assistant",
                "content": [{
                    "type": "tool_use",
                    "id": id,
                    "name": name,
                    "input": input,
                }],
            }),
            ChatMessage::ToolResult { id, content } => serde_json::json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": id,
                    "content": content,
                }],
            }),
        })
        .collect();

    let mut body = serde_json::json!({
        "model": req.model,
        "system": req.system,
        "messages": messages,
        "temperature": req.temperature,
        "max_tokens": req.max_tokens,
        "stream": stream,
    });
    if !req.tools.is_empty() {
        body["tools"] = serde_json::Value::Array(
            req.tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect(),
        );
    }
    body
}

/// Parse Anthropic streaming SSE and forward events through `tx`.
/// Honors `cancel` between every network chunk.
async fn process_anthropic_stream(
    resp: reqwest::Response,
    tx: mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) {
    let mut byte_stream = resp.bytes_stream();
    let mut lines = SseLineBuffer::new();

    let mut current_event = String::new();
    let mut current_block_type = String::new();
    let mut tool_use_id = String::new();
    let mut tool_use_name = String::new();
    let mut tool_use_input_json = String::new();
    let mut model = String::new();
    let mut tokens_in = 0u32;
    let mut tokens_out = 0u32;
    let mut stop_reason = String::new();

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
            let Some(parsed) = parse_sse_line(&line) else {
                continue;
            };
            match parsed {
                SseParsed::Event(ev) => current_event = ev,
                SseParsed::Data(data) => {
                    if let Some(event) = parse_data_block(
                        &current_event,
                        &data,
                        &mut current_block_type,
                        &mut tool_use_id,
                        &mut tool_use_name,
                        &mut tool_use_input_json,
                        &mut model,
                        &mut tokens_in,
                        &mut tokens_out,
                        &mut stop_reason,
                    ) {
                        if tx.send(event).await.is_err() {
                            return; // receiver dropped
                        }
                    }
                }
            }
        }
    }

    let _ = tx
        .send(StreamEvent::Done {
            model,
            tokens_in,
            tokens_out,
            stop_reason: if stop_reason.is_empty() {
                "end_turn".to_string()
            } else {
                stop_reason
            },
        })
        .await;
}

/// Parse a single SSE data block based on the current event type.
#[allow(clippy::too_many_arguments)]
fn parse_data_block(
    event_type: &str,
    data: &str,
    current_block_type: &mut String,
    tool_use_id: &mut String,
    tool_use_name: &mut String,
    tool_use_input_json: &mut String,
    model: &mut String,
    tokens_in: &mut u32,
    tokens_out: &mut u32,
    stop_reason: &mut String,
) -> Option<StreamEvent> {
    match event_type {
        "message_start" => {
            if let Ok(msg) = serde_json::from_str::<MessageStart>(data) {
                *model = msg.message.model;
                *tokens_in = msg.message.usage.input_tokens;
            }
            None
        }

        "content_block_start" => {
            if let Ok(block_start) = serde_json::from_str::<ContentBlockStart>(data) {
                *current_block_type = block_start.content_block.block_type.clone();
                if block_start.content_block.block_type == "tool_use" {
                    *tool_use_id = block_start.content_block.id.unwrap_or_default();
                    *tool_use_name = block_start.content_block.name.unwrap_or_default();
                    tool_use_input_json.clear();
                }
            }
            None
        }

        "content_block_delta" => {
            if let Ok(delta) = serde_json::from_str::<ContentBlockDelta>(data) {
                match delta.delta.delta_type.as_str() {
                    "text_delta" => {
                        if let Some(text) = delta.delta.text {
                            return Some(StreamEvent::TextDelta { text });
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta.delta.partial_json {
                            tool_use_input_json.push_str(&partial);
                        }
                    }
                    other => {
                        debug!(delta_type = other, "unhandled delta type");
                    }
                }
            }
            None
        }

        "content_block_stop" => {
            // A closing tool_use block yields the fully accumulated call.
            if current_block_type == "tool_use" {
                let input = serde_json::from_str::<serde_json::Value>(tool_use_input_json.as_str())
                    .unwrap_or(serde_json::Value::Object(Default::default()));
                let event = StreamEvent::ToolUse {
                    id: std::mem::take(tool_use_id),
                    name: std::mem::take(tool_use_name),
                    input,
                };
                tool_use_input_json.clear();
                current_block_type.clear();
                return Some(event);
            }
            current_block_type.clear();
            None
        }

        "message_delta" => {
            if let Ok(delta) = serde_json::from_str::<MessageDelta>(data) {
                *tokens_out = delta.usage.output_tokens;
                if let Some(reason) = delta.delta.stop_reason {
                    *stop_reason = reason;
                }
            }
            None
        }

        "error" => {
            warn!(data, "anthropic stream error");
            Some(StreamEvent::Error {
                message: data.to_string(),
            })
        }

        // message_stop and unknown events — no action needed.
        _ => None,
    }
}

// Anthropic SSE data types (deserialization only).

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    content: Vec<ContentBlock>,
    usage: FullUsage,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct FullUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct MessageStart {
    message: MessageStartInner,
}

#[derive(Deserialize)]
struct MessageStartInner {
    model: String,
    usage: InputUsage,
}

#[derive(Deserialize)]
struct InputUsage {
    input_tokens: u32,
}

#[derive(Deserialize)]
struct ContentBlockStart {
    content_block: ContentBlockMeta,
}

#[derive(Deserialize)]
struct ContentBlockMeta {
    #[serde(rename = "type")]
    block_type: String,
    id: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaContent,
}

#[derive(Deserialize)]
struct DeltaContent {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
    partial_json: Option<String>,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaInner,
    usage: OutputUsage,
}

#[derive(Deserialize)]
struct MessageDeltaInner {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct OutputUsage {
    output_tokens: u32,
}
