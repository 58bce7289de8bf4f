//! Action execution against the handler registry.
//!
//! Actions run strictly in order. Each one is fault-isolated: a failing,
//! missing, panicking or timed-out handler yields a failed result for that
//! action only and the batch carries on.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::action::{Action, Capability};
use crate::edit::{self, EditOutcome, MultiEditOutcome};
use crate::error::HandlerError;
use crate::events::AgentEvent;
use crate::handlers::{FileSystem, HandlerRegistry};

/// Status of a file edit, reported alongside the result text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    Applied,
    AlreadyApplied,
    NotFound,
    Ambiguous,
}

/// Outcome of one executed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Action label, e.g. `read src/main.rs`
    pub action: String,
    pub success: bool,
    /// Handler output
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_status: Option<EditStatus>,
}

impl ActionResult {
    /// Create a successful result
    pub fn ok(action: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: true,
            result: result.into(),
            error: None,
            edit_status: None,
        }
    }

    /// Create a failed result
    pub fn failed(action: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            success: false,
            result: String::new(),
            error: Some(error.into()),
            edit_status: None,
        }
    }

    /// Whether the edit was a no-op because it was already applied
    pub fn is_already_applied(&self) -> bool {
        self.edit_status == Some(EditStatus::AlreadyApplied)
    }
}

struct Output {
    text: String,
    edit_status: Option<EditStatus>,
}

impl Output {
    fn edit(text: String, status: EditStatus) -> Self {
        Self {
            text,
            edit_status: Some(status),
        }
    }
}

impl From<String> for Output {
    fn from(text: String) -> Self {
        Self {
            text,
            edit_status: None,
        }
    }
}

struct Failure {
    error: String,
    edit_status: Option<EditStatus>,
}

impl Failure {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            edit_status: None,
        }
    }

    fn edit(error: String, status: EditStatus) -> Self {
        Self {
            error,
            edit_status: Some(status),
        }
    }
}

impl From<HandlerError> for Failure {
    fn from(e: HandlerError) -> Self {
        Self::new(e.to_string())
    }
}

/// Upper bound on lines returned by a read without a limit
const MAX_READ_LINES: usize = 2000;
/// Longer lines are cut to keep results readable
const MAX_LINE_LENGTH: usize = 2000;

/// Executes parsed actions. Holds no conversation state.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<HandlerRegistry>,
    action_timeout: Option<Duration>,
    event_tx: Option<broadcast::Sender<AgentEvent>>,
}

impl Executor {
    /// Create an executor over a registry
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            action_timeout: None,
            event_tx: None,
        }
    }

    /// Hard limit for each action. Delegated sub-tasks are exempt.
    pub fn with_action_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.action_timeout = timeout;
        self
    }

    /// Publish `ActionStart`/`ActionEnd` events
    pub fn with_events(mut self, tx: broadcast::Sender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run `actions` in order. Stops early (returning what ran) once
    /// `cancel` fires.
    pub async fn execute(&self, actions: &[Action], cancel: &CancellationToken) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            if cancel.is_cancelled() {
                tracing::debug!("Cancelled with {} actions left", actions.len() - results.len());
                break;
            }

            let label = action.label();
            self.emit(AgentEvent::ActionStart {
                label: label.clone(),
            });

            let result = self.execute_one(action, label).await;
            if result.success {
                tracing::debug!("Action ok: {}", result.action);
            } else {
                tracing::debug!(
                    "Action failed: {}: {}",
                    result.action,
                    result.error.as_deref().unwrap_or("")
                );
            }

            self.emit(AgentEvent::ActionEnd {
                result: result.clone(),
            });
            results.push(result);
        }
        results
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    async fn execute_one(&self, action: &Action, label: String) -> ActionResult {
        let run = AssertUnwindSafe(self.dispatch(action)).catch_unwind();
        let timeout = self
            .action_timeout
            .filter(|_| action.capability() != Capability::Delegate);

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(HandlerError::Timeout(limit).into())),
            },
            None => run.await,
        };

        match outcome {
            Ok(Ok(output)) => ActionResult {
                action: label,
                success: true,
                result: output.text,
                error: None,
                edit_status: output.edit_status,
            },
            Ok(Err(failure)) => ActionResult {
                action: label,
                success: false,
                result: String::new(),
                error: Some(failure.error),
                edit_status: failure.edit_status,
            },
            Err(_) => {
                tracing::warn!("Handler panicked while running {}", label);
                ActionResult::failed(label, "handler panicked")
            }
        }
    }

    async fn dispatch(&self, action: &Action) -> Result<Output, Failure> {
        let r = &*self.registry;
        let missing = || HandlerError::Unavailable(action.kind());

        match action {
            Action::Read(a) => {
                let fs = r.fs.as_ref().ok_or_else(missing)?;
                let content = read_existing(fs.as_ref(), &a.path).await?;
                Ok(format_read(&content, a.offset, a.limit)
                    .map_err(Failure::new)?
                    .into())
            }
            Action::Edit(a) => {
                let fs = r.fs.as_ref().ok_or_else(missing)?;
                let content = read_existing(fs.as_ref(), &a.path).await?;
                match edit::apply_edit(&content, &a.search, &a.replace, a.replace_all) {
                    EditOutcome::Applied(updated) => {
                        fs.write(&a.path, &updated).await?;
                        Ok(Output::edit(
                            format!("Edited {}\n{}", a.path, edit::render_diff(&content, &updated)),
                            EditStatus::Applied,
                        ))
                    }
                    EditOutcome::AlreadyApplied => Ok(Output::edit(
                        format!(
                            "already_applied: {} already contains this change; nothing was written",
                            a.path
                        ),
                        EditStatus::AlreadyApplied,
                    )),
                    EditOutcome::NotFound => Err(Failure::edit(
                        format!(
                            "not_found: the search text does not occur in {}. Read the file again and copy the exact text.",
                            a.path
                        ),
                        EditStatus::NotFound,
                    )),
                    EditOutcome::Ambiguous(count) => Err(Failure::edit(
                        format!(
                            "ambiguous: the search text occurs {} times in {}. Include more surrounding lines or set replace-all.",
                            count, a.path
                        ),
                        EditStatus::Ambiguous,
                    )),
                }
            }
            Action::MultiEdit(a) => {
                let fs = r.fs.as_ref().ok_or_else(missing)?;
                let content = read_existing(fs.as_ref(), &a.path).await?;
                let total = a.edits.len();
                match edit::apply_multi_edit(&content, &a.edits) {
                    MultiEditOutcome::Applied {
                        content: updated,
                        applied,
                        already_applied,
                    } => {
                        fs.write(&a.path, &updated).await?;
                        let mut text = format!("Edited {} ({} of {} edits applied", a.path, applied, total);
                        if already_applied > 0 {
                            text.push_str(&format!(", {} already applied", already_applied));
                        }
                        text.push_str(")\n");
                        text.push_str(&edit::render_diff(&content, &updated));
                        Ok(Output::edit(text, EditStatus::Applied))
                    }
                    MultiEditOutcome::AlreadyApplied => Ok(Output::edit(
                        format!(
                            "already_applied: all {} edits are already present in {}; nothing was written",
                            total, a.path
                        ),
                        EditStatus::AlreadyApplied,
                    )),
                    MultiEditOutcome::NotFound { index } => Err(Failure::edit(
                        format!(
                            "not_found: edit {} of {} does not match {}. No edits were applied.",
                            index + 1,
                            total,
                            a.path
                        ),
                        EditStatus::NotFound,
                    )),
                    MultiEditOutcome::Ambiguous { index, count } => Err(Failure::edit(
                        format!(
                            "ambiguous: edit {} of {} matches {} times in {}. No edits were applied.",
                            index + 1,
                            total,
                            count,
                            a.path
                        ),
                        EditStatus::Ambiguous,
                    )),
                }
            }
            Action::Write(a) => {
                let fs = r.fs.as_ref().ok_or_else(missing)?;
                fs.write(&a.path, &a.content).await?;
                Ok(format!("Wrote {} lines to {}", a.content.lines().count(), a.path).into())
            }
            Action::Create(a) => {
                let fs = r.fs.as_ref().ok_or_else(missing)?;
                if fs.exists(&a.path).await? {
                    return Err(Failure::new(format!(
                        "{} already exists. Use edit or write to change an existing file.",
                        a.path
                    )));
                }
                fs.write(&a.path, &a.content).await?;
                Ok(format!("Created {} ({} lines)", a.path, a.content.lines().count()).into())
            }
            Action::Bash(a) => {
                let shell = r.shell.as_ref().ok_or_else(missing)?;
                let timeout = a.timeout_secs.map(Duration::from_secs);
                Ok(shell.exec(&a.command, timeout).await?.into())
            }
            Action::Git(a) => {
                let shell = r.shell.as_ref().ok_or_else(missing)?;
                Ok(shell.git(&a.args).await?.into())
            }
            Action::Ps => {
                let shell = r.shell.as_ref().ok_or_else(missing)?;
                Ok(shell.ps().await?.into())
            }
            Action::Kill(a) => {
                let shell = r.shell.as_ref().ok_or_else(missing)?;
                Ok(shell.kill(a.pid).await?.into())
            }
            Action::Glob(a) => {
                let search = r.search.as_ref().ok_or_else(missing)?;
                Ok(search.glob(&a.pattern, a.path.as_deref()).await?.into())
            }
            Action::Grep(a) => {
                let search = r.search.as_ref().ok_or_else(missing)?;
                Ok(search
                    .grep(&a.pattern, a.path.as_deref(), a.include.as_deref())
                    .await?
                    .into())
            }
            Action::Ls(a) => {
                let search = r.search.as_ref().ok_or_else(missing)?;
                Ok(search.list(&a.path).await?.into())
            }
            Action::Fetch(a) => {
                let web = r.web.as_ref().ok_or_else(missing)?;
                Ok(web.fetch(&a.url).await?.into())
            }
            Action::Search(a) => {
                let web = r.web.as_ref().ok_or_else(missing)?;
                Ok(web.search(&a.query).await?.into())
            }
            Action::Format(a) => {
                let tools = r.dev_tools.as_ref().ok_or_else(missing)?;
                Ok(tools.format(&a.path).await?.into())
            }
            Action::Typecheck(a) => {
                let tools = r.dev_tools.as_ref().ok_or_else(missing)?;
                Ok(tools.typecheck(a.path.as_deref()).await?.into())
            }
            Action::Schedule(a) => {
                let scheduler = r.scheduler.as_ref().ok_or_else(missing)?;
                Ok(scheduler.schedule(&a.name, &a.cron, &a.task).await?.into())
            }
            Action::Notify(a) => {
                let notifier = r.notifier.as_ref().ok_or_else(missing)?;
                let report = notifier.notify(&a.message, a.target.as_deref()).await?;
                if report.sent.is_empty() {
                    let failed = if report.failed.is_empty() {
                        "no targets configured".to_string()
                    } else {
                        report.failed.join(", ")
                    };
                    return Err(Failure::new(format!("notification not delivered: {}", failed)));
                }
                let mut text = format!("Sent to {}", report.sent.join(", "));
                if !report.failed.is_empty() {
                    text.push_str(&format!("; failed: {}", report.failed.join(", ")));
                }
                Ok(text.into())
            }
            Action::Skill(a) => {
                let skills = r.skills.as_ref().ok_or_else(missing)?;
                Ok(skills.load(&a.name).await?.into())
            }
            Action::SkillInstall(a) => {
                let skills = r.skills.as_ref().ok_or_else(missing)?;
                Ok(skills.install(&a.source).await?.into())
            }
            Action::Plan(a) => {
                let delegate = r.delegate.as_ref().ok_or_else(missing)?;
                Ok(delegate.plan(&a.plan).await?.into())
            }
            Action::Task(a) => {
                let delegate = r.delegate.as_ref().ok_or_else(missing)?;
                Ok(delegate.task(&a.description, &a.prompt).await?.into())
            }
            Action::Explore(a) => {
                let delegate = r.delegate.as_ref().ok_or_else(missing)?;
                Ok(delegate.explore(&a.query).await?.into())
            }
            Action::ConnectorConfig(a) => {
                let connectors = r.connectors.as_ref().ok_or_else(missing)?;
                Ok(connectors
                    .configure(&a.platform, &a.key, &a.value)
                    .await?
                    .into())
            }
        }
    }
}

/// Execute `actions` against `registry` with no timeout or events
pub async fn execute_actions(actions: &[Action], registry: &Arc<HandlerRegistry>) -> Vec<ActionResult> {
    Executor::new(Arc::clone(registry))
        .execute(actions, &CancellationToken::new())
        .await
}

async fn read_existing(fs: &dyn FileSystem, path: &str) -> Result<String, Failure> {
    fs.read_to_string(path)
        .await?
        .ok_or_else(|| Failure::new(format!("file not found: {}", path)))
}

/// Select lines `offset..offset+limit` (1-based offset) with notices about
/// truncation and remaining lines.
fn format_read(content: &str, offset: Option<usize>, limit: Option<usize>) -> Result<String, String> {
    let lines: Vec<&str> = content.lines().collect();
    let total = lines.len();
    let start = offset.unwrap_or(1).saturating_sub(1);
    let limit = limit.unwrap_or(MAX_READ_LINES);

    if total == 0 {
        return Ok(String::new());
    }
    if start >= total {
        return Err(format!(
            "offset {} is beyond end of file ({} lines total)",
            start + 1,
            total
        ));
    }

    let end = (start + limit).min(total);
    let mut had_truncated = false;
    let selected: Vec<String> = lines[start..end]
        .iter()
        .map(|line| {
            if line.chars().count() > MAX_LINE_LENGTH {
                had_truncated = true;
                line.chars().take(MAX_LINE_LENGTH).collect()
            } else {
                line.to_string()
            }
        })
        .collect();

    let mut output = selected.join("\n");
    let mut notices = Vec::new();
    if had_truncated {
        notices.push(format!("some lines were truncated to {} characters", MAX_LINE_LENGTH));
    }
    if end < total {
        notices.push(format!(
            "lines {}-{} not shown; the file counts as read, use grep or bash to see them",
            end + 1,
            total
        ));
    }
    if !notices.is_empty() {
        output.push_str(&format!("\n\n... ({})", notices.join(". ")));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::*;
    use crate::handlers::{HandlerResult, Shell};
    use crate::testing::MemoryFs;
    use async_trait::async_trait;

    fn registry_with(fs: Arc<MemoryFs>) -> Arc<HandlerRegistry> {
        Arc::new(HandlerRegistry::new().with_fs(fs))
    }

    fn read(path: &str) -> Action {
        Action::Read(ReadAction {
            path: path.into(),
            offset: None,
            limit: None,
        })
    }

    #[tokio::test]
    async fn test_missing_handler_is_not_available() {
        let actions = crate::parser::parse_actions("I'll fix it now.\n<read path=\"a.ts\"/>");
        let results = execute_actions(&actions, &Arc::new(HandlerRegistry::new())).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("not available"));
        assert_eq!(results[0].action, "read a.ts");
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let fs = Arc::new(MemoryFs::with_files(&[("b.txt", "hello")]));
        let actions = vec![
            read("missing.txt"),
            Action::Notify(NotifyAction {
                message: "hi".into(),
                target: None,
            }),
            read("b.txt"),
        ];
        let results = execute_actions(&actions, &registry_with(fs)).await;
        assert_eq!(results.len(), 3);
        assert!(!results[0].success);
        assert!(!results[1].success);
        assert!(results[2].success);
        assert_eq!(results[2].result, "hello");
    }

    #[tokio::test]
    async fn test_multi_edit_missing_pattern_leaves_file_identical() {
        let original = "alpha\nbeta\ngamma\n";
        let fs = Arc::new(MemoryFs::with_files(&[("f.txt", original)]));
        let action = Action::MultiEdit(MultiEditAction {
            path: "f.txt".into(),
            edits: vec![
                EditPair {
                    search: "alpha".into(),
                    replace: "ALPHA".into(),
                },
                EditPair {
                    search: "delta".into(),
                    replace: "DELTA".into(),
                },
                EditPair {
                    search: "gamma".into(),
                    replace: "GAMMA".into(),
                },
            ],
        });
        let results = execute_actions(&[action], &registry_with(Arc::clone(&fs))).await;
        assert!(!results[0].success);
        assert_eq!(results[0].edit_status, Some(EditStatus::NotFound));
        assert_eq!(fs.get("f.txt").as_deref(), Some(original));
        assert_eq!(fs.write_count(), 0);
    }

    #[tokio::test]
    async fn test_multi_edit_with_stale_pair_writes_nothing() {
        let original = "alpha\nbeta\n";
        let fs = Arc::new(MemoryFs::with_files(&[("f.txt", original)]));
        let action = Action::MultiEdit(MultiEditAction {
            path: "f.txt".into(),
            edits: vec![
                EditPair {
                    search: "alpha".into(),
                    replace: "ALPHA".into(),
                },
                EditPair {
                    search: "delta".into(),
                    replace: "beta".into(),
                },
            ],
        });
        let results = execute_actions(&[action], &registry_with(Arc::clone(&fs))).await;
        assert!(!results[0].success);
        assert_eq!(results[0].edit_status, Some(EditStatus::NotFound));
        assert_eq!(fs.get("f.txt").as_deref(), Some(original));
        assert_eq!(fs.write_count(), 0);
    }

    #[tokio::test]
    async fn test_noop_edit_reports_already_applied_without_write() {
        let fs = Arc::new(MemoryFs::with_files(&[("f.rs", "let x = 1;\n")]));
        let action = Action::Edit(EditAction {
            path: "f.rs".into(),
            search: "x = 1".into(),
            replace: "x = 1".into(),
            replace_all: false,
        });
        let results = execute_actions(&[action], &registry_with(Arc::clone(&fs))).await;
        assert!(results[0].success);
        assert!(results[0].is_already_applied());
        assert_eq!(fs.write_count(), 0);
    }

    #[tokio::test]
    async fn test_edit_applies_and_reports_diff() {
        let fs = Arc::new(MemoryFs::with_files(&[("f.rs", "let x = 1;\n")]));
        let action = Action::Edit(EditAction {
            path: "f.rs".into(),
            search: "x = 1".into(),
            replace: "x = 2".into(),
            replace_all: false,
        });
        let results = execute_actions(&[action], &registry_with(Arc::clone(&fs))).await;
        assert!(results[0].success);
        assert!(results[0].result.contains("+let x = 2;"));
        assert_eq!(fs.get("f.rs").as_deref(), Some("let x = 2;\n"));
    }

    #[tokio::test]
    async fn test_create_refuses_existing_file() {
        let fs = Arc::new(MemoryFs::with_files(&[("a", "old")]));
        let action = Action::Create(CreateAction {
            path: "a".into(),
            content: "new".into(),
        });
        let results = execute_actions(&[action], &registry_with(Arc::clone(&fs))).await;
        assert!(!results[0].success);
        assert_eq!(fs.get("a").as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_read_offset_and_limit() {
        let fs = Arc::new(MemoryFs::with_files(&[("f", "1\n2\n3\n4\n5\n")]));
        let action = Action::Read(ReadAction {
            path: "f".into(),
            offset: Some(2),
            limit: Some(2),
        });
        let results = execute_actions(&[action], &registry_with(fs)).await;
        assert!(results[0].result.starts_with("2\n3\n\n..."));
        assert!(results[0].result.contains("lines 4-5 not shown"));
    }

    struct SlowShell;

    #[async_trait]
    impl Shell for SlowShell {
        async fn exec(&self, _command: &str, _timeout: Option<Duration>) -> HandlerResult<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".into())
        }
    }

    struct PanickingShell;

    #[async_trait]
    impl Shell for PanickingShell {
        async fn exec(&self, _command: &str, _timeout: Option<Duration>) -> HandlerResult<String> {
            panic!("boom")
        }
    }

    fn bash(command: &str) -> Action {
        Action::Bash(BashAction {
            command: command.into(),
            timeout_secs: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_timeout_is_a_failed_result() {
        let registry = Arc::new(HandlerRegistry::new().with_shell(Arc::new(SlowShell)));
        let executor = Executor::new(registry).with_action_timeout(Some(Duration::from_secs(5)));
        let results = executor
            .execute(&[bash("sleep 60"), Action::Ps], &CancellationToken::new())
            .await;
        assert_eq!(results[0].error.as_deref(), Some("timed out after 5s"));
        assert_eq!(results[1].error.as_deref(), Some("not available"));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let registry = Arc::new(HandlerRegistry::new().with_shell(Arc::new(PanickingShell)));
        let results = execute_actions(&[bash("x"), bash("y")], &registry).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].error.as_deref(), Some("handler panicked"));
    }

    #[tokio::test]
    async fn test_cancel_stops_remaining_actions() {
        let fs = Arc::new(MemoryFs::with_files(&[("a", "x")]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = Executor::new(registry_with(fs))
            .execute(&[read("a")], &cancel)
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let fs = Arc::new(MemoryFs::with_files(&[("a", "x")]));
        let (tx, mut rx) = broadcast::channel(16);
        Executor::new(registry_with(fs))
            .with_events(tx)
            .execute(&[read("a")], &CancellationToken::new())
            .await;
        assert!(matches!(rx.recv().await.unwrap(), AgentEvent::ActionStart { label } if label == "read a"));
        assert!(matches!(rx.recv().await.unwrap(), AgentEvent::ActionEnd { result } if result.success));
    }
}
