//! Transport abstraction for the model call

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kite_ai::providers::ChatProvider;
use kite_ai::{ChatRequest, Completion, Result, StreamEvent, StreamEventStream};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Check if an error message describes a transient failure. Used for errors
/// that only survive as text, such as an error event on a stream.
fn is_retryable_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    // Rate limits and overload
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("overloaded") {
        return true;
    }
    // Transient network errors
    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("connection") {
        return true;
    }
    // Server errors (5xx)
    ["500", "502", "503", "504"]
        .iter()
        .any(|code| lower.contains(code))
}

/// Carries one model call. Implementations deliver a stream of events
/// whether or not the endpoint streams.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and stream the response
    async fn send(&self, request: &ChatRequest) -> Result<StreamEventStream>;
}

/// Direct provider transport with retry on transient failures.
///
/// Retries only happen before the first event reaches the caller; once
/// output has started streaming an error is final.
pub struct ProviderTransport {
    provider: Arc<dyn ChatProvider>,
    retry_config: RetryConfig,
}

impl ProviderTransport {
    /// Create a new provider transport
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    async fn open(&self, request: &ChatRequest) -> Result<StreamEventStream> {
        if !request.stream {
            let completion = self.provider.complete(request).await?;
            return Ok(completion_stream(completion));
        }

        let mut stream = self.provider.stream(request).await?;
        match stream.next().await {
            Some(StreamEvent::Error { message }) => Err(kite_ai::Error::Sse(message)),
            Some(first) => Ok(Box::pin(futures::stream::once(async move { first }).chain(stream))),
            None => Ok(Box::pin(futures::stream::empty())),
        }
    }
}

/// Replay a non-streamed completion as stream events
fn completion_stream(completion: Completion) -> StreamEventStream {
    let mut events = Vec::new();
    if !completion.reasoning.is_empty() {
        events.push(StreamEvent::ReasoningDelta {
            delta: completion.reasoning,
        });
    }
    if !completion.content.is_empty() {
        events.push(StreamEvent::ContentDelta {
            delta: completion.content,
        });
    }
    events.push(StreamEvent::Usage {
        usage: completion.usage,
    });
    events.push(StreamEvent::Done {
        finish_reason: completion.finish_reason,
    });
    Box::pin(futures::stream::iter(events))
}

#[async_trait]
impl Transport for ProviderTransport {
    async fn send(&self, request: &ChatRequest) -> Result<StreamEventStream> {
        let mut attempt = 0u32;
        loop {
            match self.open(request).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    // Typed check plus string fallback for errors that arrived as text
                    let error_msg = e.to_string();
                    let retryable = match &e {
                        kite_ai::Error::Sse(message) => is_retryable_error(message),
                        other => other.is_retryable() || is_retryable_error(&error_msg),
                    };

                    if attempt < self.retry_config.max_retries && retryable {
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        tracing::warn!(
                            "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                            attempt + 1,
                            self.retry_config.max_retries + 1,
                            error_msg,
                            delay
                        );
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    return Err(e);
                }
            }
        }
    }
}
