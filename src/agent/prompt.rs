//! Flattening OpenAI chat messages into a single agent prompt.

use serde::Deserialize;
use serde_json::Value;

/// One OpenAI chat message. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(MessageContent::Text(text.into())),
        }
    }

    pub fn text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::text)
            .unwrap_or_default()
    }
}

/// Message content as sent by OpenAI clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    /// Any other JSON shape; carries no text.
    Other(Value),
}

impl MessageContent {
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts.iter().map(ContentPart::text).collect(),
            MessageContent::Other(_) => String::new(),
        }
    }
}

/// One element of array content. A part that matches no known shape is kept
/// as raw JSON so the rest of the message still renders.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContentPart {
    Typed(TypedPart),
    Malformed(Value),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedPart {
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

impl ContentPart {
    fn text(&self) -> &str {
        match self {
            ContentPart::Typed(TypedPart::Text { text }) => text.as_deref().unwrap_or(""),
            ContentPart::Typed(TypedPart::Unsupported) | ContentPart::Malformed(_) => "",
        }
    }
}

fn role_label(role: &str) -> String {
    match role.to_lowercase().as_str() {
        "user" => "User".to_string(),
        "assistant" => "Assistant".to_string(),
        "tool" | "function" => "Tool".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => "User".to_string(),
            }
        }
    }
}

fn is_system_role(role: &str) -> bool {
    matches!(role.to_lowercase().as_str(), "system" | "developer")
}

/// Build the agent prompt from an ordered message sequence.
///
/// System and developer messages form a leading `System:` block; the rest
/// become `<Label>: <text>` turns. Empty messages contribute nothing. The
/// prompt always ends with `\n\nAssistant:`.
pub fn build_prompt(messages: &[ChatMessage]) -> String {
    let mut system = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        let text = message.text();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if is_system_role(&message.role) {
            system.push(text.to_string());
        } else {
            turns.push(format!("{}: {}", role_label(&message.role), text));
        }
    }

    let mut prompt = String::new();
    if !system.is_empty() {
        prompt.push_str("System:\n");
        prompt.push_str(&system.join("\n\n"));
        prompt.push_str("\n\n");
    }
    prompt.push_str(&turns.join("\n\n"));
    prompt.push_str("\n\nAssistant:");
    prompt
}
