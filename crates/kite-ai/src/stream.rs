//! Streaming event types and utilities

use crate::types::{Completion, Usage};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted while a model response streams in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Visible content delta (`delta.content`)
    ContentDelta { delta: String },
    /// Reasoning delta (`delta.reasoning_content`)
    ReasoningDelta { delta: String },
    /// Usage reported by the endpoint, usually in the final chunk
    Usage { usage: Usage },
    /// Stream terminated by the sentinel
    Done { finish_reason: Option<String> },
    /// Error occurred; no further events follow
    Error { message: String },
}

impl StreamEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

/// A stream of model events
pub type StreamEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Accumulates streamed events into a [`Completion`]
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    content: String,
    reasoning: String,
    usage: Usage,
    finish_reason: Option<String>,
}

impl ResponseBuilder {
    /// Create a new response builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a streaming event and update the response state
    pub fn process_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ContentDelta { delta } => self.content.push_str(delta),
            StreamEvent::ReasoningDelta { delta } => self.reasoning.push_str(delta),
            StreamEvent::Usage { usage } => self.usage = *usage,
            StreamEvent::Done { finish_reason } => self.finish_reason = finish_reason.clone(),
            StreamEvent::Error { .. } => {}
        }
    }

    /// Visible text received so far
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Reasoning text received so far
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Build the final completion
    pub fn build(self) -> Completion {
        Completion {
            content: self.content,
            reasoning: self.reasoning,
            usage: self.usage,
            finish_reason: self.finish_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_deltas() {
        let mut builder = ResponseBuilder::new();
        for event in [
            StreamEvent::ReasoningDelta { delta: "hmm ".into() },
            StreamEvent::ReasoningDelta { delta: "ok".into() },
            StreamEvent::ContentDelta { delta: "Hello ".into() },
            StreamEvent::ContentDelta { delta: "world".into() },
            StreamEvent::Usage {
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 4,
                    total_tokens: 14,
                },
            },
            StreamEvent::Done {
                finish_reason: Some("stop".into()),
            },
        ] {
            builder.process_event(&event);
        }
        assert_eq!(builder.content(), "Hello world");
        let completion = builder.build();
        assert_eq!(completion.reasoning, "hmm ok");
        assert_eq!(completion.usage.total_tokens, 14);
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::Done { finish_reason: None }.is_terminal());
        assert!(StreamEvent::Error { message: "x".into() }.is_terminal());
        assert!(!StreamEvent::ContentDelta { delta: "x".into() }.is_terminal());
    }
}
