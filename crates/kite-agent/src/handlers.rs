//! Capability handler contract.
//!
//! The host wires whichever capabilities it has; every slot is optional and
//! an action whose capability is missing fails with "not available".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::Capability;
use crate::error::HandlerError;

/// Result type returned by handlers
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// File access used by read, edit, multi-edit, write and create
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file, `None` if it does not exist
    async fn read_to_string(&self, path: &str) -> HandlerResult<Option<String>>;

    /// Write (create or truncate) a file, creating parent directories
    async fn write(&self, path: &str, content: &str) -> HandlerResult<()>;

    /// Whether a file exists
    async fn exists(&self, path: &str) -> HandlerResult<bool> {
        Ok(self.read_to_string(path).await?.is_some())
    }
}

/// Command execution used by bash, git, ps and kill
#[async_trait]
pub trait Shell: Send + Sync {
    /// Run a shell command and return its combined output
    async fn exec(&self, command: &str, timeout: Option<Duration>) -> HandlerResult<String>;

    /// Run `git <args>`
    async fn git(&self, args: &str) -> HandlerResult<String> {
        self.exec(&format!("git {}", args), None).await
    }

    /// Whether `ps`/`kill` are supported
    fn supports_processes(&self) -> bool {
        false
    }

    /// List background processes started by the agent
    async fn ps(&self) -> HandlerResult<String> {
        Err(HandlerError::Unavailable("ps"))
    }

    /// Kill a background process
    async fn kill(&self, _pid: u32) -> HandlerResult<String> {
        Err(HandlerError::Unavailable("kill"))
    }
}

/// Workspace search used by glob, grep and ls
#[async_trait]
pub trait Search: Send + Sync {
    async fn glob(&self, pattern: &str, path: Option<&str>) -> HandlerResult<String>;

    async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        include: Option<&str>,
    ) -> HandlerResult<String>;

    async fn list(&self, path: &str) -> HandlerResult<String>;
}

/// Network access used by fetch and search
#[async_trait]
pub trait Web: Send + Sync {
    async fn fetch(&self, url: &str) -> HandlerResult<String>;

    /// Whether web search is supported
    fn supports_search(&self) -> bool {
        false
    }

    async fn search(&self, _query: &str) -> HandlerResult<String> {
        Err(HandlerError::Unavailable("search"))
    }
}

/// Project tooling used by format and typecheck
#[async_trait]
pub trait DevTools: Send + Sync {
    async fn format(&self, path: &str) -> HandlerResult<String>;

    async fn typecheck(&self, path: Option<&str>) -> HandlerResult<String>;
}

/// Outcome of a notification fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyReport {
    /// Targets the message reached
    pub sent: Vec<String>,
    /// Targets that failed
    pub failed: Vec<String>,
}

/// Notification sink. Only called for an explicit notify action.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, target: Option<&str>) -> HandlerResult<NotifyReport>;
}

/// Recurring task registration
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule(&self, name: &str, cron: &str, task: &str) -> HandlerResult<String>;
}

/// Skill file loader
#[async_trait]
pub trait Skills: Send + Sync {
    /// Load a skill by name and return its instructions
    async fn load(&self, name: &str) -> HandlerResult<String>;

    /// Install a skill from a source
    async fn install(&self, source: &str) -> HandlerResult<String>;
}

/// Sub-task delegation used by plan, task and explore
#[async_trait]
pub trait Delegate: Send + Sync {
    async fn plan(&self, plan: &str) -> HandlerResult<String>;

    async fn task(&self, description: &str, prompt: &str) -> HandlerResult<String>;

    async fn explore(&self, query: &str) -> HandlerResult<String>;
}

/// Remote platform settings
#[async_trait]
pub trait Connectors: Send + Sync {
    async fn configure(&self, platform: &str, key: &str, value: &str) -> HandlerResult<String>;
}

/// The capabilities supplied by the host. Built once, then shared
/// read-only for the lifetime of the agent.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    pub fs: Option<Arc<dyn FileSystem>>,
    pub shell: Option<Arc<dyn Shell>>,
    pub search: Option<Arc<dyn Search>>,
    pub web: Option<Arc<dyn Web>>,
    pub dev_tools: Option<Arc<dyn DevTools>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub scheduler: Option<Arc<dyn Scheduler>>,
    pub skills: Option<Arc<dyn Skills>>,
    pub delegate: Option<Arc<dyn Delegate>>,
    pub connectors: Option<Arc<dyn Connectors>>,
}

impl HandlerRegistry {
    /// Registry with nothing wired
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_shell(mut self, shell: Arc<dyn Shell>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn with_search(mut self, search: Arc<dyn Search>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_web(mut self, web: Arc<dyn Web>) -> Self {
        self.web = Some(web);
        self
    }

    pub fn with_dev_tools(mut self, dev_tools: Arc<dyn DevTools>) -> Self {
        self.dev_tools = Some(dev_tools);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_skills(mut self, skills: Arc<dyn Skills>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn Delegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn with_connectors(mut self, connectors: Arc<dyn Connectors>) -> Self {
        self.connectors = Some(connectors);
        self
    }

    /// Copy of this registry without delegation, for sub-agents
    pub fn without_delegate(&self) -> Self {
        Self {
            delegate: None,
            ..self.clone()
        }
    }

    /// Whether actions needing `capability` can run
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::FileSystem => self.fs.is_some(),
            Capability::Shell => self.shell.is_some(),
            Capability::Processes => self.shell.as_ref().is_some_and(|s| s.supports_processes()),
            Capability::Search => self.search.is_some(),
            Capability::Web => self.web.is_some(),
            Capability::WebSearch => self.web.as_ref().is_some_and(|w| w.supports_search()),
            Capability::DevTools => self.dev_tools.is_some(),
            Capability::Notifier => self.notifier.is_some(),
            Capability::Scheduler => self.scheduler.is_some(),
            Capability::Skills => self.skills.is_some(),
            Capability::Delegate => self.delegate.is_some(),
            Capability::Connectors => self.connectors.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoShell;

    #[async_trait]
    impl Shell for EchoShell {
        async fn exec(&self, command: &str, _timeout: Option<Duration>) -> HandlerResult<String> {
            Ok(command.to_string())
        }
    }

    #[tokio::test]
    async fn test_shell_defaults() {
        let shell = EchoShell;
        assert_eq!(shell.git("status").await.unwrap(), "git status");
        assert_eq!(shell.ps().await, Err(HandlerError::Unavailable("ps")));
    }

    #[test]
    fn test_supports() {
        let registry = HandlerRegistry::new().with_shell(Arc::new(EchoShell));
        assert!(registry.supports(Capability::Shell));
        assert!(!registry.supports(Capability::Processes));
        assert!(!registry.supports(Capability::FileSystem));
        assert!(!registry.supports(Capability::Notifier));
    }
}
