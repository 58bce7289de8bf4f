//! OpenAI-compatible Chat Completions provider

use std::collections::HashMap;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::ChatProvider;
use crate::{
    error::{Error, Result},
    stream::{StreamEvent, StreamEventStream},
    types::{ChatRequest, Completion, Content, Message, Usage},
};

/// Default endpoint used when none is configured
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Option<Duration>,
    headers: HashMap<String, String>,
}

impl OpenAIProvider {
    /// Create a new provider for an endpoint
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: None,
            headers: HashMap::new(),
        }
    }

    /// Create from environment variables (`KITE_API_KEY`, then `OPENAI_API_KEY`)
    pub fn from_env(base_url: impl Into<String>) -> Result<Self> {
        let api_key = super::get_api_key(None, &["KITE_API_KEY", "OPENAI_API_KEY"])?;
        Ok(Self::new(base_url, api_key))
    }

    /// Set a hard timeout for each model call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add an extra header sent with every request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|_| Error::InvalidApiKey)?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        for (key, value) in &self.headers {
            let name = key
                .parse::<HeaderName>()
                .map_err(|e| Error::InvalidConfig(format!("header '{}': {}", key, e)))?;
            let val = value
                .parse::<HeaderValue>()
                .map_err(|e| Error::InvalidConfig(format!("header '{}': {}", key, e)))?;
            headers.insert(name, val);
        }
        Ok(headers)
    }

    fn request_builder(&self, body: &OpenAIRequest) -> Result<reqwest::RequestBuilder> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .headers(self.header_map()?)
            .json(body);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    async fn stream(&self, request: &ChatRequest) -> Result<StreamEventStream> {
        let body = build_request(request, true);
        let mut event_source = EventSource::new(self.request_builder(&body)?)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        // Surface HTTP failures as typed errors before handing out a stream
        let first = match event_source.next().await {
            Some(Ok(Event::Open)) => None,
            Some(Ok(Event::Message(msg))) => Some(msg.data),
            Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                event_source.close();
                let text = response.text().await.unwrap_or_default();
                return Err(Error::from_status(status.as_u16(), text));
            }
            Some(Err(reqwest_eventsource::Error::Transport(e))) => {
                event_source.close();
                return Err(map_http_error(e));
            }
            Some(Err(e)) => {
                event_source.close();
                return Err(Error::Sse(e.to_string()));
            }
            None => return Err(Error::Sse("stream closed before it opened".into())),
        };

        Ok(Box::pin(create_stream(event_source, first)))
    }

    async fn complete(&self, request: &ChatRequest) -> Result<Completion> {
        let body = build_request(request, false);
        let response = self
            .request_builder(&body)?
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), text));
        }

        let parsed: CompletionResponse = response.json().await.map_err(map_http_error)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnexpectedResponse("response contained no choices".into()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            reasoning: choice
                .message
                .reasoning_content
                .or(choice.message.reasoning)
                .unwrap_or_default(),
            usage: parsed.usage.map(Usage::from).unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }
}

fn map_http_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(e)
    }
}

fn build_request(request: &ChatRequest, stream: bool) -> OpenAIRequest {
    OpenAIRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(convert_message).collect(),
        stream,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        stream_options: stream.then_some(StreamOptions {
            include_usage: true,
        }),
    }
}

fn convert_message(msg: &Message) -> OpenAIMessage {
    match msg {
        Message::System { content } => OpenAIMessage {
            role: "system",
            content: MessageContent::Text(content.clone()),
        },
        Message::User { content, .. } => {
            let has_images = content.iter().any(|c| matches!(c, Content::Image { .. }));
            let content = if has_images {
                MessageContent::Parts(
                    content
                        .iter()
                        .map(|c| match c {
                            Content::Text { text } => ContentPart::Text { text: text.clone() },
                            Content::Image { .. } => ContentPart::ImageUrl {
                                image_url: ImageUrl {
                                    url: c.data_url().unwrap_or_default(),
                                },
                            },
                        })
                        .collect(),
                )
            } else {
                MessageContent::Text(msg.text())
            };
            OpenAIMessage {
                role: "user",
                content,
            }
        }
        // Reasoning is never sent back to the endpoint
        Message::Assistant { content, .. } => OpenAIMessage {
            role: "assistant",
            content: MessageContent::Text(content.clone()),
        },
    }
}

/// Events parsed out of one SSE data payload
#[derive(Debug, Default, PartialEq)]
struct ParsedChunk {
    events: Vec<StreamEvent>,
    finish_reason: Option<String>,
}

/// Parse one SSE data payload. Returns `None` for malformed chunks, which the
/// caller skips without aborting the stream.
fn parse_chunk(data: &str) -> Option<ParsedChunk> {
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    let mut parsed = ParsedChunk::default();

    if let Some(error) = chunk.error {
        parsed.events.push(StreamEvent::Error {
            message: error.message,
        });
        return Some(parsed);
    }

    for choice in chunk.choices {
        let reasoning = choice.delta.reasoning_content.or(choice.delta.reasoning);
        if let Some(delta) = reasoning.filter(|d| !d.is_empty()) {
            parsed.events.push(StreamEvent::ReasoningDelta { delta });
        }
        if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
            parsed.events.push(StreamEvent::ContentDelta { delta });
        }
        if choice.finish_reason.is_some() {
            parsed.finish_reason = choice.finish_reason;
        }
    }

    if let Some(usage) = chunk.usage {
        parsed.events.push(StreamEvent::Usage {
            usage: usage.into(),
        });
    }

    Some(parsed)
}

fn create_stream(
    mut event_source: EventSource,
    first: Option<String>,
) -> impl futures::Stream<Item = StreamEvent> {
    stream! {
        let mut finish_reason: Option<String> = None;
        let mut pending = first;

        loop {
            let data = match pending.take() {
                Some(data) => data,
                None => match event_source.next().await {
                    None | Some(Err(reqwest_eventsource::Error::StreamEnded)) => break,
                    Some(Ok(Event::Open)) => continue,
                    Some(Ok(Event::Message(msg))) => msg.data,
                    Some(Err(reqwest_eventsource::Error::InvalidStatusCode(status, response))) => {
                        event_source.close();
                        let body = response.text().await.unwrap_or_default();
                        yield StreamEvent::Error {
                            message: Error::from_status(status.as_u16(), body).to_string(),
                        };
                        return;
                    }
                    Some(Err(e)) => {
                        event_source.close();
                        yield StreamEvent::Error {
                            message: format!("SSE error: {}", e),
                        };
                        return;
                    }
                },
            };

            if data.trim() == "[DONE]" {
                break;
            }

            match parse_chunk(&data) {
                Some(parsed) => {
                    if parsed.finish_reason.is_some() {
                        finish_reason = parsed.finish_reason;
                    }
                    for event in parsed.events {
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            event_source.close();
                            return;
                        }
                    }
                }
                None => {
                    tracing::debug!("Skipping malformed stream chunk ({} bytes)", data.len());
                }
            }
        }

        event_source.close();
        yield StreamEvent::Done { finish_reason };
    }
}

// Request types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

// Response types. Every field is defaulted so unknown or missing fields
// never fail a chunk.

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: if u.total_tokens == 0 {
                u.prompt_tokens + u.completion_tokens
            } else {
                u.total_tokens
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}
