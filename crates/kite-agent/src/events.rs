//! Agent event types

use kite_ai::Usage;
use serde::{Deserialize, Serialize};

use crate::agent::StopReason;
use crate::executor::ActionResult;
use crate::guards::CorrectionKind;

/// Events emitted during a request. The host renders from these; the core
/// never writes to the terminal itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Agent started processing a request
    AgentStart,

    /// A new model turn started
    TurnStart { turn: u32 },

    /// Displayable response text (never contains a partial action tag)
    TextDelta { delta: String },

    /// The model started emitting reasoning
    ThinkingStart,

    /// Reasoning text
    ThinkingDelta { delta: String },

    /// Reasoning finished (or the request was aborted mid-thought)
    ThinkingEnd,

    /// An action is about to run
    ActionStart { label: String },

    /// An action finished
    ActionEnd { result: ActionResult },

    /// A mistake guard fired and corrective guidance was injected
    Correction { kind: CorrectionKind },

    /// History was truncated to a sliding window
    HistoryCompressed { before: usize, after: usize },

    /// Token usage of one model call
    Usage { usage: Usage },

    /// Agent finished processing
    AgentEnd { reason: StopReason },

    /// Error occurred
    Error { message: String },
}

impl AgentEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::AgentEnd { .. } | AgentEvent::Error { .. })
    }
}
