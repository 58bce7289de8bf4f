//! Error types for kite-agent

use std::time::Duration;

use thiserror::Error;

/// Result type alias using kite-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that escape the agent loop.
///
/// Only transport failures are fatal; everything that goes wrong inside a
/// batch of actions is reported back to the model instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The model call itself failed (network, auth, exhausted retries)
    #[error(transparent)]
    Transport(#[from] kite_ai::Error),

    /// A request was submitted while another one is still in flight
    #[error("Agent is busy with another request")]
    Busy,

    /// A generic agent error
    #[error("{0}")]
    Other(String),
}

/// Failure of a single capability handler.
///
/// These never propagate out of the executor; they become failed
/// `ActionResult`s.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The host did not wire this capability
    #[error("not available")]
    Unavailable(&'static str),

    /// The handler ran and failed
    #[error("{0}")]
    Failed(String),

    /// The handler exceeded its time limit
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl HandlerError {
    /// Shorthand for a failed handler with a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        Self::Failed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message() {
        assert_eq!(HandlerError::Unavailable("notify").to_string(), "not available");
    }

    #[test]
    fn test_timeout_message() {
        let e = HandlerError::Timeout(Duration::from_secs(30));
        assert_eq!(e.to_string(), "timed out after 30s");
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let e: Error = kite_ai::Error::InvalidApiKey.into();
        assert_eq!(e.to_string(), "Invalid or missing API key");
    }
}
