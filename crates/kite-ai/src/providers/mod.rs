//! Model provider implementations

pub mod openai;

use crate::{ChatRequest, Completion, Error, Result, StreamEventStream};
use async_trait::async_trait;

/// Trait for chat-completion providers
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Stream a response from the model
    async fn stream(&self, request: &ChatRequest) -> Result<StreamEventStream>;

    /// Request a single, non-streamed response
    async fn complete(&self, request: &ChatRequest) -> Result<Completion>;
}

/// Get an API key from a provided value or the first set environment variable
pub fn get_api_key(provided: Option<&str>, env_vars: &[&str]) -> Result<String> {
    if let Some(key) = provided.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }

    env_vars
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .ok_or(Error::InvalidApiKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_api_key_prefers_provided() {
        let key = get_api_key(Some("sk-test"), &["KITE_TEST_UNSET_VAR"]).unwrap();
        assert_eq!(key, "sk-test");
    }

    #[test]
    fn test_get_api_key_missing() {
        let err = get_api_key(None, &["KITE_TEST_DEFINITELY_UNSET_VAR"]).unwrap_err();
        assert!(matches!(err, Error::InvalidApiKey));
    }

    #[test]
    fn test_get_api_key_blank_provided_falls_through() {
        assert!(get_api_key(Some("  "), &["KITE_TEST_DEFINITELY_UNSET_VAR"]).is_err());
    }
}
