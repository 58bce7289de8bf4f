//! Conversation log and usage counters.

use kite_ai::{Message, Usage};
use serde::{Deserialize, Serialize};

/// Sliding-window settings for history compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Compress once more than this many messages (excluding the system
    /// message) are stored
    pub max_messages: usize,
    /// Number of most recent messages kept after compression
    pub keep_messages: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: 40,
            keep_messages: 20,
        }
    }
}

/// Accumulated token usage. Only reset on explicit request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub requests: u64,
}

impl UsageStats {
    /// Add one model call
    pub fn record(&mut self, usage: &Usage) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total_tokens);
        self.requests += 1;
    }
}

/// Append-only message log with exactly one system message, always first.
///
/// The only in-place change is regenerating the system message; the only
/// removal is explicit sliding-window compression.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    usage: UsageStats,
}

impl Conversation {
    /// Start a conversation with a system prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            usage: UsageStats::default(),
        }
    }

    /// All messages, system message first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The current system prompt
    pub fn system_prompt(&self) -> &str {
        match self.messages.first() {
            Some(Message::System { content }) => content,
            _ => "",
        }
    }

    /// Replace the system message in full
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.messages[0] = Message::system(prompt);
    }

    /// Append a message. System messages are rejected; there is only one.
    pub fn push(&mut self, message: Message) {
        if matches!(message, Message::System { .. }) {
            tracing::warn!("Ignoring extra system message");
            return;
        }
        self.messages.push(message);
    }

    /// Append several messages in order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.push(message);
        }
    }

    /// Number of messages excluding the system message
    pub fn len(&self) -> usize {
        self.messages.len() - 1
    }

    /// Whether only the system message is present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything but the system message
    pub fn clear(&mut self) {
        self.messages.truncate(1);
    }

    /// Apply the sliding window. Returns `(before, after)` message counts
    /// when anything was dropped.
    pub fn compress(&mut self, config: &HistoryConfig) -> Option<(usize, usize)> {
        let before = self.len();
        if before <= config.max_messages {
            return None;
        }
        let keep = config.keep_messages.min(before);
        self.messages.drain(1..self.messages.len() - keep);
        Some((before, self.len()))
    }

    /// Usage accumulated so far
    pub fn usage(&self) -> UsageStats {
        self.usage
    }

    /// Record usage of one model call
    pub fn record_usage(&mut self, usage: &Usage) {
        self.usage.record(usage);
    }

    /// Reset usage counters
    pub fn reset_usage(&mut self) {
        self.usage = UsageStats::default();
    }
}
