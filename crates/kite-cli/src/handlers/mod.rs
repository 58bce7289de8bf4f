//! Capability handlers for the local machine

mod delegate;
mod devtools;
mod fs;
mod search;
mod shell;
mod web;

pub use delegate::SubAgents;
pub use devtools::CommandDevTools;
pub use fs::LocalFs;
pub use search::LocalSearch;
pub use shell::LocalShell;
pub use web::HttpWeb;

use kite_agent::{AgentConfig, ConnectorLimits, HandlerRegistry, Transport};
use std::path::Path;
use std::sync::Arc;

/// Settings needed to wire the handlers
pub struct HandlerOptions {
    pub format_command: Option<String>,
    pub typecheck_command: Option<String>,
    /// Configuration for delegated sub-agents
    pub agent: AgentConfig,
    pub sub_agent_limits: ConnectorLimits,
    pub project_context: Option<String>,
}

/// Wire every capability this machine offers. Notifications, scheduling,
/// skills and connectors stay unwired and fail with "not available".
pub fn build_registry(
    root: &Path,
    transport: Arc<dyn Transport>,
    options: HandlerOptions,
) -> HandlerRegistry {
    let shell = Arc::new(LocalShell::new(root));

    let mut registry = HandlerRegistry::new()
        .with_fs(Arc::new(LocalFs::new(root)))
        .with_shell(shell.clone())
        .with_search(Arc::new(LocalSearch::new(root)))
        .with_web(Arc::new(HttpWeb::new()));

    if options.format_command.is_some() || options.typecheck_command.is_some() {
        registry = registry.with_dev_tools(Arc::new(CommandDevTools::new(
            shell,
            options.format_command,
            options.typecheck_command,
        )));
    }

    let sub_agents = SubAgents::new(
        transport,
        &registry,
        options.agent,
        options.sub_agent_limits,
    )
    .with_project_context(options.project_context);
    registry.with_delegate(Arc::new(sub_agents))
}
