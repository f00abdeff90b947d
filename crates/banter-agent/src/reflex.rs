use regex::{Regex, RegexBuilder};

/// Output of the reflex layer.
#[derive(Debug, Clone)]
pub struct ReflexReply {
    pub text: String,
    pub confidence: f64,
}

/// Fast deterministic response layer. Matches a fixed set of inputs
/// (greetings, acknowledgments, trivial clock queries) that can be
/// answered without any model call.
pub struct ReflexMatcher {
    greeting: Regex,
    ack: Regex,
    time_query: Regex,
    date_query: Regex,
}

impl ReflexMatcher {
    pub fn new() -> Self {
        Self {
            greeting: case_insensitive(
                r"\b(hi|hello|hey|good\s*(morning|afternoon|evening))\b|\bhow\s+are\s+you\b|\bwhat'?s\s+up\b",
            ),
            ack: case_insensitive(
                r"^(ok|okay|sure|yes|no|yep|nope|got\s*it|i\s*see|thanks|thank\s*you|thx)$",
            ),
            time_query: case_insensitive(r"what\s+time\s+is\s+it|what'?s\s+the\s+time"),
            date_query: case_insensitive(r"what\s+day\s+is\s+it"),
        }
    }

    /// True when the input is fully answerable without the cognition path.
    pub fn can_handle(&self, input: &str) -> bool {
        let text = input.trim().to_lowercase();
        self.greeting.is_match(&text)
            || self.ack.is_match(&text)
            || self.time_query.is_match(&text)
            || self.date_query.is_match(&text)
    }

    /// Produce the deterministic reply. Only meaningful when
    /// [`can_handle`](Self::can_handle) returned true.
    pub fn respond(&self, input: &str, user_name: Option<&str>) -> ReflexReply {
        let text = input.trim().to_lowercase();

        if self.greeting.is_match(&text) {
            let greeting = match user_name.filter(|n| !n.is_empty()) {
                Some(name) => format!("Hi, {name}! How can I help you?"),
                None => "Hi! How can I help you?".to_string(),
            };
            return ReflexReply {
                text: greeting,
                confidence: 1.0,
            };
        }

        if self.ack.is_match(&text) {
            return ReflexReply {
                text: "Got it!".to_string(),
                confidence: 1.0,
            };
        }

        let now = chrono::Local::now();
        if self.time_query.is_match(&text) {
            return ReflexReply {
                text: format!("It's {}.", now.format("%I:%M %p")),
                confidence: 1.0,
            };
        }
        if self.date_query.is_match(&text) {
            return ReflexReply {
                text: format!("Today is {}.", now.format("%A, %B %d")),
                confidence: 1.0,
            };
        }

        ReflexReply {
            text: "I'm not sure.".to_string(),
            confidence: 0.3,
        }
    }
}

impl Default for ReflexMatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("reflex pattern must compile")
}
