use serde::{Deserialize, Serialize};

/// Static persona configuration selected per session. Read-only to the
/// turn — the orchestrator injects it into the system prompt and never
/// mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub system_prompt: String,
    /// Free-form style hint appended to the prompt (e.g. "warm, concise").
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub traits: Vec<String>,
}

impl Persona {
    /// Render the persona into a single system prompt string.
    pub fn render(&self) -> String {
        let mut prompt = self.system_prompt.clone();
        if !self.style.is_empty() {
            prompt.push_str(&format!("\n\nStyle: {}", self.style));
        }
        if !self.traits.is_empty() {
            prompt.push_str(&format!("\nTraits: {}", self.traits.join(", ")));
        }
        prompt
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "companion".to_string(),
            system_prompt: "You are a helpful, friendly conversational assistant. \
                            Keep replies natural and suited to being spoken aloud."
                .to_string(),
            style: "warm, concise".to_string(),
            traits: vec!["attentive".to_string(), "curious".to_string()],
        }
    }
}
