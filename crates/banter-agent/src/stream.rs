/// Events emitted during LLM streaming.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },

    /// Model wants to call a tool.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Stream completed successfully.
    Done {
        model: String,
        tokens_in: u32,
        tokens_out: u32,
        stop_reason: String,
    },

    /// Error during streaming.
    Error { message: String },
}

/// Parse a single SSE line.
/// SSE format: `event: <type>\ndata: <json>\n\n`
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

/// Incremental splitter for SSE byte streams: buffers partial lines
/// across network chunks and yields only complete lines.
#[derive(Default)]
pub struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk; returns the complete lines it closed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut lines: Vec<String> = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line = self.buf[..pos].trim().to_string();
            self.buf.drain(..=pos);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}
