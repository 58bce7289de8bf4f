//! kite-ai: chat-completions transport layer
//!
//! This crate provides the message types exchanged with a language model and
//! an OpenAI-compatible provider that streams `delta.content` and
//! `delta.reasoning_content` chunks.

pub mod error;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use stream::{ResponseBuilder, StreamEvent, StreamEventStream};
pub use types::*;
