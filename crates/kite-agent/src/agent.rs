//! The agent loop: request a turn, parse actions, apply the mistake guards,
//! execute, feed results back, repeat until the model answers without
//! actions.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kite_ai::{ChatRequest, Content, Message, ResponseBuilder, StreamEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    assembler::StreamAssembler,
    conversation::{Conversation, HistoryConfig, UsageStats},
    error::Result,
    events::AgentEvent,
    executor::Executor,
    feedback::{self, EMPTY_BATCH_NOTE},
    guards::{self, CorrectionKind},
    handle::AgentHandle,
    handlers::HandlerRegistry,
    prompt::{self, DEFAULT_PERSONALITY, Environment},
    transport::Transport,
    turn::TurnState,
};

/// Bounds that keep the loop from running away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    /// Consecutive fully failed batches before giving up
    pub fail_fast_after: u32,
    /// Dropped duplicate reads that trigger a correction
    pub duplicate_read_limit: usize,
    /// Retries when the model thinks but says nothing
    pub empty_response_retries: u32,
    /// Corrections of each kind allowed per request
    pub max_corrections: u32,
    /// Character budget for action results fed back to the model
    pub result_budget_chars: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            fail_fast_after: 3,
            duplicate_read_limit: 3,
            empty_response_retries: 2,
            max_corrections: 3,
            result_budget_chars: 12_000,
        }
    }
}

/// Caps for conversations started from a remote platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorLimits {
    pub max_iterations: u32,
    /// Wall clock limit for the whole request
    pub timeout: Duration,
}

impl Default for ConnectorLimits {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model identifier sent with every request
    pub model: String,
    /// Maximum tokens per response
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Stream responses instead of waiting for the whole reply
    pub stream: bool,
    /// Strip action tags from displayed text
    pub hide_actions: bool,
    /// Hard limit for each non-delegated action
    pub action_timeout: Option<Duration>,
    pub history: HistoryConfig,
    pub limits: LoopLimits,
    /// Iteration and wall clock caps. `None` for interactive use.
    pub connector: Option<ConnectorLimits>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: None,
            temperature: None,
            stream: true,
            hide_actions: true,
            action_timeout: Some(Duration::from_secs(300)),
            history: HistoryConfig::default(),
            limits: LoopLimits::default(),
            connector: None,
        }
    }
}

/// Why a request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without actions
    Done,
    /// Repeated failures; the text summarizes them
    FailFast,
    /// Connector iteration cap reached
    IterationLimit,
    /// Connector wall clock cap reached
    Timeout,
    /// The model kept returning nothing visible
    EmptyResponse,
    /// Aborted through the handle
    Aborted,
}

/// Result of one user request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub reason: StopReason,
    /// Final answer, or a summary when the loop stopped early
    pub text: String,
    /// Model turns used
    pub iterations: u32,
}

/// Per-request inputs owned by the caller
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    images: Vec<Content>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an image (base64 data) to the next request
    pub fn add_image(&mut self, data: impl Into<String>, mime_type: impl Into<String>) {
        self.images.push(Content::image(data, mime_type));
    }

    pub fn with_image(mut self, data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        self.add_image(data, mime_type);
        self
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    fn take_images(&mut self) -> Vec<Content> {
        std::mem::take(&mut self.images)
    }
}

/// One completed model reply
struct Reply {
    text: String,
    reasoning: String,
}

enum Streamed {
    Reply(Reply),
    Aborted,
    TimedOut,
}

/// The main agent that owns the conversation and drives the loop
pub struct Agent {
    config: AgentConfig,
    conversation: Conversation,
    transport: Arc<dyn Transport>,
    registry: Arc<HandlerRegistry>,
    event_tx: broadcast::Sender<AgentEvent>,
    handle: AgentHandle,
    personality: String,
    project_context: Option<String>,
    environment: Environment,
}

impl Agent {
    /// Create a new agent
    pub fn new(config: AgentConfig, transport: Arc<dyn Transport>, registry: Arc<HandlerRegistry>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let environment = Environment::current();
        let system = prompt::build_system_prompt(DEFAULT_PERSONALITY, &registry, None, &environment);
        Self {
            config,
            conversation: Conversation::new(system),
            transport,
            registry,
            event_tx,
            handle: AgentHandle::new(),
            personality: DEFAULT_PERSONALITY.to_string(),
            project_context: None,
            environment,
        }
    }

    /// Subscribe to agent events
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.event_tx.subscribe()
    }

    /// Get a cloneable handle for aborting from external code.
    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    /// Abort the current request
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Get the agent config
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The capabilities this agent dispatches to
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Get all messages, system message first
    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// Accumulated token usage
    pub fn usage(&self) -> UsageStats {
        self.conversation.usage()
    }

    pub fn reset_usage(&mut self) {
        self.conversation.reset_usage();
    }

    /// Drop the history, keeping the system message
    pub fn clear_history(&mut self) {
        self.conversation.clear();
    }

    pub fn set_personality(&mut self, personality: impl Into<String>) {
        self.personality = personality.into();
        self.refresh_system_prompt();
    }

    pub fn set_project_context(&mut self, context: Option<String>) {
        self.project_context = context;
        self.refresh_system_prompt();
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
        self.refresh_system_prompt();
    }

    fn refresh_system_prompt(&mut self) {
        let system = prompt::build_system_prompt(
            &self.personality,
            &self.registry,
            self.project_context.as_deref(),
            &self.environment,
        );
        self.conversation.set_system_prompt(system);
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Send a message and run the loop until it stops
    pub async fn prompt(&mut self, input: &str) -> Result<Outcome> {
        self.prompt_with_context(input, &mut RequestContext::new()).await
    }

    /// Like [`Agent::prompt`], attaching the context's images to the user
    /// message. The context is emptied once they are attached.
    pub async fn prompt_with_context(&mut self, input: &str, context: &mut RequestContext) -> Result<Outcome> {
        let cancel = self.handle.begin()?;
        let span = tracing::info_span!("request", id = %uuid::Uuid::new_v4());
        let result = self.run(input, context, cancel).instrument(span).await;
        self.handle.finish();
        result
    }

    async fn run(&mut self, input: &str, context: &mut RequestContext, cancel: CancellationToken) -> Result<Outcome> {
        self.emit(AgentEvent::AgentStart);

        if let Some((before, after)) = self.conversation.compress(&self.config.history) {
            tracing::warn!("History compressed from {} to {} messages", before, after);
            self.emit(AgentEvent::HistoryCompressed { before, after });
        }

        let mut content = vec![Content::text(input)];
        content.extend(context.take_images());
        // Not part of the history until the model has answered
        let mut pending = vec![Message::user_with_content(content)];

        let limits = self.config.limits;
        let mut state = TurnState::new();
        let deadline = self.config.connector.map(|c| state.started() + c.timeout);
        let executor = Executor::new(Arc::clone(&self.registry))
            .with_action_timeout(self.config.action_timeout)
            .with_events(self.event_tx.clone());
        let mut nudge: Option<Message> = None;

        let outcome = loop {
            if let Some(caps) = self.config.connector {
                if state.iterations() >= caps.max_iterations {
                    break stopped_early(StopReason::IterationLimit, &state);
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break stopped_early(StopReason::Timeout, &state);
                }
            }

            let turn = state.next_iteration();
            self.emit(AgentEvent::TurnStart { turn });
            tracing::info!("Turn {}", turn);

            let reply = match self.request_turn(&pending, nudge.take(), &cancel, deadline).await {
                Ok(Streamed::Reply(reply)) => reply,
                Ok(Streamed::Aborted) => {
                    tracing::info!("Request aborted");
                    break Outcome {
                        reason: StopReason::Aborted,
                        text: String::new(),
                        iterations: turn,
                    };
                }
                Ok(Streamed::TimedOut) => break stopped_early(StopReason::Timeout, &state),
                Err(e) => {
                    self.emit(AgentEvent::Error { message: e.to_string() });
                    return Err(e);
                }
            };

            let extracted = guards::extract_actions(&reply.text);
            let mut actions = extracted.actions.clone();
            for action in guards::extract_actions(&reply.reasoning).actions {
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }

            if actions.is_empty() {
                if guards::is_empty_turn(&reply.text, &reply.reasoning) {
                    if state.allow_empty_retry(limits.empty_response_retries) {
                        tracing::warn!("Empty response after reasoning, retrying");
                        self.emit(AgentEvent::Correction {
                            kind: CorrectionKind::EmptyResponse,
                        });
                        nudge = Some(Message::user(CorrectionKind::EmptyResponse.message()));
                        continue;
                    }
                    tracing::warn!("Giving up after {} empty responses", limits.empty_response_retries + 1);
                    break Outcome {
                        reason: StopReason::EmptyResponse,
                        text: "The model returned an empty response.".to_string(),
                        iterations: turn,
                    };
                }

                let mistake = if guards::is_code_block_mistake(&extracted) {
                    Some(CorrectionKind::CodeBlock)
                } else if guards::looks_like_hallucinated_code(&reply.text) {
                    Some(CorrectionKind::Hallucination)
                } else {
                    None
                };
                if let Some(kind) = mistake {
                    if state.allow_correction(kind, limits.max_corrections) {
                        tracing::warn!("Correcting model mistake: {:?}", kind);
                        self.correct(&mut pending, &reply, kind);
                        continue;
                    }
                    tracing::warn!("Correction bound reached for {:?}, accepting answer", kind);
                }

                self.commit(&mut pending, &reply);
                tracing::info!("Final answer after {} turns", turn);
                break Outcome {
                    reason: StopReason::Done,
                    text: reply.text,
                    iterations: turn,
                };
            }

            let (actions, dropped) = state.filter_duplicate_reads(actions);
            if dropped > 0 && state.duplicate_reads() >= limits.duplicate_read_limit {
                state.reset_duplicate_reads();
                if !state.allow_correction(CorrectionKind::DuplicateRead, limits.max_corrections) {
                    tracing::warn!("Model keeps re-reading files, failing fast");
                    self.commit(&mut pending, &reply);
                    break Outcome {
                        reason: StopReason::FailFast,
                        text: "Stopped: the model kept re-reading files it already has instead of making progress."
                            .to_string(),
                        iterations: turn,
                    };
                }
                tracing::warn!("Too many duplicate reads, correcting");
                self.correct(&mut pending, &reply, CorrectionKind::DuplicateRead);
                continue;
            }

            if actions.is_empty() {
                self.commit(&mut pending, &reply);
                let text = feedback::format_feedback(&[], &[EMPTY_BATCH_NOTE], limits.result_budget_chars);
                pending.push(Message::user(text));
                continue;
            }

            let results = executor.execute(&actions, &cancel).await;
            if cancel.is_cancelled() {
                tracing::info!("Request aborted during actions");
                break Outcome {
                    reason: StopReason::Aborted,
                    text: String::new(),
                    iterations: turn,
                };
            }

            state.record_reads(&actions, &results);
            self.commit(&mut pending, &reply);

            let failures = state.record_batch(&results);
            if failures >= limits.fail_fast_after {
                tracing::warn!("{} consecutive failed batches, failing fast", failures);
                break Outcome {
                    reason: StopReason::FailFast,
                    text: fail_fast_summary(failures, state.failed_actions()),
                    iterations: turn,
                };
            }

            let note = skipped_note(dropped);
            let notes: Vec<&str> = note.iter().map(String::as_str).collect();
            let text = feedback::format_feedback(&results, &notes, limits.result_budget_chars);
            pending.push(Message::user(text));
        };

        self.emit(AgentEvent::AgentEnd { reason: outcome.reason });
        Ok(outcome)
    }

    /// Move the pending user messages and the assistant reply into history
    fn commit(&mut self, pending: &mut Vec<Message>, reply: &Reply) {
        self.conversation.extend(pending.drain(..));
        self.conversation
            .push(Message::assistant(&reply.text).with_reasoning(Some(reply.reasoning.clone())));
    }

    /// Keep the faulty turn and follow it with corrective guidance
    fn correct(&mut self, pending: &mut Vec<Message>, reply: &Reply, kind: CorrectionKind) {
        self.emit(AgentEvent::Correction { kind });
        self.commit(pending, reply);
        pending.push(Message::user(kind.message()));
    }

    /// Send the conversation plus pending messages and stream the reply
    async fn request_turn(
        &mut self,
        pending: &[Message],
        nudge: Option<Message>,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Streamed> {
        let mut messages = self.conversation.messages().to_vec();
        messages.extend(pending.iter().cloned());
        messages.extend(nudge);
        let request = ChatRequest {
            messages,
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: self.config.stream,
        };

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Streamed::Aborted),
            _ = wait_until(deadline) => return Ok(Streamed::TimedOut),
            opened = self.transport.send(&request) => opened?,
        };

        let mut assembler = StreamAssembler::new(self.config.hide_actions);
        let mut builder = ResponseBuilder::new();
        let mut thinking = false;

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if thinking {
                        self.emit(AgentEvent::ThinkingEnd);
                    }
                    return Ok(Streamed::Aborted);
                }
                _ = wait_until(deadline) => {
                    if thinking {
                        self.emit(AgentEvent::ThinkingEnd);
                    }
                    return Ok(Streamed::TimedOut);
                }
                event = stream.next() => event,
            };
            let Some(event) = event else { break };
            builder.process_event(&event);

            match event {
                StreamEvent::ReasoningDelta { delta } => {
                    if !thinking {
                        thinking = true;
                        self.emit(AgentEvent::ThinkingStart);
                    }
                    self.emit(AgentEvent::ThinkingDelta { delta });
                }
                StreamEvent::ContentDelta { delta } => {
                    if thinking {
                        thinking = false;
                        self.emit(AgentEvent::ThinkingEnd);
                    }
                    let shown = assembler.feed(&delta);
                    if !shown.is_empty() {
                        self.emit(AgentEvent::TextDelta { delta: shown });
                    }
                }
                StreamEvent::Usage { .. } => {}
                StreamEvent::Done { .. } => break,
                StreamEvent::Error { message } => {
                    if thinking {
                        self.emit(AgentEvent::ThinkingEnd);
                    }
                    return Err(kite_ai::Error::Sse(message).into());
                }
            }
        }

        if thinking {
            self.emit(AgentEvent::ThinkingEnd);
        }
        let rest = assembler.flush();
        if !rest.is_empty() {
            self.emit(AgentEvent::TextDelta { delta: rest });
        }

        let completion = builder.build();
        tracing::debug!(
            "Reply: {} chars, {} reasoning chars",
            completion.content.len(),
            completion.reasoning.len()
        );
        self.conversation.record_usage(&completion.usage);
        self.emit(AgentEvent::Usage {
            usage: completion.usage,
        });

        Ok(Streamed::Reply(Reply {
            text: completion.content,
            reasoning: completion.reasoning,
        }))
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Best-effort summary when a cap stops the loop
fn stopped_early(reason: StopReason, state: &TurnState) -> Outcome {
    let mut text = match reason {
        StopReason::IterationLimit => format!("Stopped after {} turns without finishing.", state.iterations()),
        _ => format!(
            "Stopped: the time limit was reached after {}s.",
            state.started().elapsed().as_secs()
        ),
    };
    let completed = state.completed_actions();
    if completed.is_empty() {
        text.push_str(" No actions completed.");
    } else {
        text.push_str("\nCompleted so far:");
        for label in completed {
            text.push_str("\n- ");
            text.push_str(label);
        }
    }
    tracing::warn!("{}", text.lines().next().unwrap_or_default());
    Outcome {
        reason,
        text,
        iterations: state.iterations(),
    }
}

fn fail_fast_summary(batches: u32, failed: &[String]) -> String {
    let mut names: Vec<&str> = Vec::new();
    for label in failed {
        if !names.contains(&label.as_str()) {
            names.push(label);
        }
    }
    let mut text = format!("Stopped after {} batches of actions in a row all failed.\nFailed actions:", batches);
    for name in names {
        text.push_str("\n- ");
        text.push_str(name);
    }
    text
}

fn skipped_note(dropped: usize) -> Option<String> {
    (dropped > 0).then(|| {
        format!(
            "Skipped {} read(s) of files already in this conversation. Use the content you already have.",
            dropped
        )
    })
}
