//! kite-agent: action protocol engine and agent loop
//!
//! The model acts by writing XML-like action tags in plain text. This crate
//! parses those tags, runs them against host-supplied capability handlers,
//! feeds the results back and guards against the usual model mistakes.

pub mod action;
pub mod agent;
pub mod assembler;
pub mod conversation;
pub mod edit;
pub mod error;
pub mod events;
pub mod executor;
pub mod feedback;
pub mod grammar;
pub mod guards;
pub mod handle;
pub mod handlers;
pub mod parser;
pub mod prompt;
pub mod transport;
pub mod turn;

#[cfg(test)]
mod testing;

pub use action::{Action, Capability};
pub use agent::{Agent, AgentConfig, ConnectorLimits, LoopLimits, Outcome, RequestContext, StopReason};
pub use assembler::StreamAssembler;
pub use conversation::{Conversation, HistoryConfig, UsageStats};
pub use error::{Error, HandlerError, Result};
pub use events::AgentEvent;
pub use executor::{ActionResult, EditStatus, Executor, execute_actions};
pub use guards::CorrectionKind;
pub use handle::AgentHandle;
pub use handlers::HandlerRegistry;
pub use parser::parse_actions;
pub use prompt::Environment;
pub use transport::{ProviderTransport, RetryConfig, Transport};
