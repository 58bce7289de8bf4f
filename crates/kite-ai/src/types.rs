//! Core types for model interactions

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Conversation roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Content blocks of a user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Text content
    Text { text: String },
    /// Image content (base64 encoded)
    Image { data: String, mime_type: String },
}

impl Content {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create image content from base64 data
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Create image content from raw bytes
    pub fn image_from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::Image {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Get text if this is text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Render an image as a `data:` URL
    pub fn data_url(&self) -> Option<String> {
        match self {
            Self::Image { data, mime_type } => Some(format!("data:{};base64,{}", mime_type, data)),
            _ => None,
        }
    }
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// System prompt, always the first message of a conversation
    System { content: String },
    /// User message (text plus optional images)
    User {
        content: Vec<Content>,
        #[serde(default)]
        timestamp: i64,
    },
    /// Raw assistant turn, including any action tags
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
        #[serde(default)]
        timestamp: i64,
    },
}

impl Message {
    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            content: text.into(),
        }
    }

    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![Content::text(text)],
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a user message with multiple content blocks
    pub fn user_with_content(content: Vec<Content>) -> Self {
        Self::User {
            content,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: text.into(),
            reasoning: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Attach reasoning text to an assistant message
    pub fn with_reasoning(self, reasoning: Option<String>) -> Self {
        match self {
            Self::Assistant {
                content, timestamp, ..
            } => Self::Assistant {
                content,
                reasoning: reasoning.filter(|r| !r.trim().is_empty()),
                timestamp,
            },
            other => other,
        }
    }

    /// Get the role
    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
        }
    }

    /// Get combined text content
    pub fn text(&self) -> String {
        match self {
            Self::System { content } => content.clone(),
            Self::User { content, .. } => content
                .iter()
                .filter_map(|c| c.as_text())
                .collect::<Vec<_>>()
                .join(""),
            Self::Assistant { content, .. } => content.clone(),
        }
    }

    /// Number of image attachments carried by this message
    pub fn image_count(&self) -> usize {
        match self {
            Self::User { content, .. } => content
                .iter()
                .filter(|c| matches!(c, Content::Image { .. }))
                .count(),
            _ => 0,
        }
    }
}

/// Token usage reported for a single model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A chat request sent to the model endpoint
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Full conversation, system message first
    pub messages: Vec<Message>,
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Whether to stream the response
    pub stream: bool,
}

/// A complete, non-streamed model reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Visible response text
    pub content: String,
    /// Reasoning ("thinking") text, empty when the model produced none
    pub reasoning: String,
    /// Token usage
    pub usage: Usage,
    /// Finish reason reported by the endpoint
    pub finish_reason: Option<String>,
}
