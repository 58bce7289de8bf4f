//! Sub-agent delegation for plan, task and explore

use async_trait::async_trait;
use kite_agent::handlers::{Delegate, HandlerResult};
use kite_agent::{
    Agent, AgentConfig, ConnectorLimits, HandlerError, HandlerRegistry, StopReason, Transport,
};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::utils::stop_reason_str;

const EXPLORE_INSTRUCTIONS: &str = "Investigate the code base to answer the question below. \
Only read and search; do not modify any files. Reply with a concise answer that cites the \
relevant file paths.";

/// Runs each delegated task in a fresh nested agent.
///
/// Sub-agents share the transport, run under connector limits and get a
/// registry without delegation, so they cannot spawn agents of their own.
pub struct SubAgents {
    transport: Arc<dyn Transport>,
    registry: Arc<HandlerRegistry>,
    config: AgentConfig,
    project_context: Option<String>,
    plans: Mutex<Vec<String>>,
}

impl SubAgents {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: &HandlerRegistry,
        config: AgentConfig,
        limits: ConnectorLimits,
    ) -> Self {
        Self {
            transport,
            registry: Arc::new(registry.without_delegate()),
            config: AgentConfig {
                connector: Some(limits),
                ..config
            },
            project_context: None,
            plans: Mutex::new(Vec::new()),
        }
    }

    pub fn with_project_context(mut self, context: Option<String>) -> Self {
        self.project_context = context;
        self
    }

    async fn run(&self, prompt: &str) -> HandlerResult<String> {
        let mut agent = Agent::new(
            self.config.clone(),
            self.transport.clone(),
            self.registry.clone(),
        );
        agent.set_project_context(self.project_context.clone());

        let outcome = agent
            .prompt(prompt)
            .await
            .map_err(|e| HandlerError::failed(format!("Sub-agent failed: {}", e)))?;
        tracing::info!(
            "Sub-agent finished after {} turns: {:?}",
            outcome.iterations,
            outcome.reason
        );

        match outcome.reason {
            StopReason::Done if outcome.text.trim().is_empty() => {
                Ok("(sub-agent returned no answer)".to_string())
            }
            StopReason::Done => Ok(outcome.text),
            StopReason::Aborted | StopReason::EmptyResponse => Err(HandlerError::failed(format!(
                "Sub-agent {}",
                stop_reason_str(outcome.reason)
            ))),
            reason => Ok(format!(
                "Sub-agent {}.\n{}",
                stop_reason_str(reason),
                outcome.text
            )),
        }
    }
}

#[async_trait]
impl Delegate for SubAgents {
    async fn plan(&self, plan: &str) -> HandlerResult<String> {
        let mut plans = self.plans.lock();
        plans.push(plan.trim().to_string());
        Ok(format!("Plan {} recorded:\n{}", plans.len(), plan.trim()))
    }

    async fn task(&self, description: &str, prompt: &str) -> HandlerResult<String> {
        tracing::info!("Delegating task: {}", description);
        let request = if description.trim().is_empty() {
            prompt.to_string()
        } else {
            format!("Task: {}\n\n{}", description.trim(), prompt)
        };
        self.run(&request).await
    }

    async fn explore(&self, query: &str) -> HandlerResult<String> {
        tracing::info!("Delegating exploration: {}", query);
        self.run(&format!("{}\n\nQuestion: {}", EXPLORE_INSTRUCTIONS, query))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kite_agent::handlers::Shell;
    use kite_ai::{ChatRequest, StreamEvent, StreamEventStream};
    use std::time::Duration;

    /// Replays one canned reply per request and records what it was sent
    struct ScriptedTransport {
        replies: Mutex<Vec<String>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &ChatRequest) -> kite_ai::Result<StreamEventStream> {
            self.requests.lock().push(request.clone());
            let reply = self.replies.lock().pop().unwrap_or_else(|| "done".to_string());
            let events = vec![
                StreamEvent::ContentDelta { delta: reply },
                StreamEvent::Done {
                    finish_reason: Some("stop".to_string()),
                },
            ];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    struct EchoShell;

    #[async_trait]
    impl Shell for EchoShell {
        async fn exec(&self, command: &str, _timeout: Option<Duration>) -> HandlerResult<String> {
            Ok(format!("ran {}", command))
        }
    }

    fn sub_agents(transport: &Arc<ScriptedTransport>, registry: &HandlerRegistry) -> SubAgents {
        SubAgents::new(
            transport.clone(),
            registry,
            AgentConfig::default(),
            ConnectorLimits::default(),
        )
    }

    /// Registry of a parent agent that can delegate
    fn parent_registry(transport: &Arc<ScriptedTransport>) -> HandlerRegistry {
        let base = HandlerRegistry::new().with_shell(Arc::new(EchoShell));
        let sub = sub_agents(transport, &base);
        base.with_delegate(Arc::new(sub))
    }

    #[tokio::test]
    async fn test_plan_is_echoed() {
        let transport = ScriptedTransport::new(&[]);
        let sub = sub_agents(&transport, &HandlerRegistry::new());
        let out = sub.plan("1. read\n2. fix\n").await.unwrap();
        assert_eq!(out, "Plan 1 recorded:\n1. read\n2. fix");
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_task_runs_nested_agent() {
        let transport = ScriptedTransport::new(&["<bash>ls</bash>", "Found two files."]);
        let parent = parent_registry(&transport);
        let sub = sub_agents(&transport, &parent);

        let out = sub.task("list files", "List the files.").await.unwrap();
        assert_eq!(out, "Found two files.");

        let requests = transport.requests.lock();
        assert_eq!(requests.len(), 2);
        let system = requests[0].messages[0].text();
        assert!(system.contains("<bash>"));
        assert!(!system.contains("<task"));
        assert!(requests[0].messages[1].text().starts_with("Task: list files"));
        assert!(requests[1].messages.iter().any(|m| m.text().contains("ran ls")));
    }

    #[tokio::test]
    async fn test_explore_is_read_only_prompt() {
        let transport = ScriptedTransport::new(&["It lives in src/lib.rs."]);
        let sub = sub_agents(&transport, &HandlerRegistry::new());
        let out = sub.explore("where is the parser?").await.unwrap();
        assert_eq!(out, "It lives in src/lib.rs.");
        let requests = transport.requests.lock();
        let user = requests[0].messages[1].text();
        assert!(user.contains("do not modify"));
        assert!(user.ends_with("Question: where is the parser?"));
    }

    #[tokio::test]
    async fn test_iteration_cap_is_reported() {
        let transport = ScriptedTransport::new(&["<bash>a</bash>", "<bash>b</bash>", "<bash>c</bash>"]);
        let base = HandlerRegistry::new().with_shell(Arc::new(EchoShell));
        let limits = ConnectorLimits {
            max_iterations: 2,
            ..ConnectorLimits::default()
        };
        let sub = SubAgents::new(transport.clone(), &base, AgentConfig::default(), limits);
        let out = sub.task("", "loop").await.unwrap();
        assert!(out.starts_with("Sub-agent iteration limit reached."));
        assert_eq!(transport.requests.lock().len(), 2);
    }
}
