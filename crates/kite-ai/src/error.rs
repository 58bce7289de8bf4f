//! Error types for kite-ai

use thiserror::Error;

/// Result type alias using kite-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a model endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (status: {status})")]
    Api { status: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Request was cancelled by the caller
    #[error("Request aborted")]
    Aborted,

    /// The request exceeded its hard timeout
    #[error("Request timed out")]
    Timeout,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build an error from a non-success HTTP status and the response body.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Error::Auth(body),
            429 => Error::RateLimited(body),
            _ => Error::Api {
                status,
                message: body,
            },
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::RateLimited(_) | Error::Sse(_) | Error::Timeout => true,
            Error::Api { status, message } => {
                let msg = message.to_lowercase();
                *status >= 500 || msg.contains("overloaded") || msg.contains("rate limit")
            }
            _ => false,
        }
    }
}
