//! Typed actions parsed from model output

use serde::{Deserialize, Serialize};

/// A single instruction parsed from model text.
///
/// Actions are immutable once parsed: the loop only ever filters them out
/// or replaces a whole turn with corrective guidance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Action {
    Bash(BashAction),
    Read(ReadAction),
    Edit(EditAction),
    MultiEdit(MultiEditAction),
    Write(WriteAction),
    Create(CreateAction),
    Glob(GlobAction),
    Grep(GrepAction),
    Ls(LsAction),
    Git(GitAction),
    Fetch(FetchAction),
    Search(SearchAction),
    Format(FormatAction),
    Typecheck(TypecheckAction),
    Schedule(ScheduleAction),
    Notify(NotifyAction),
    Skill(SkillAction),
    SkillInstall(SkillInstallAction),
    Plan(PlanAction),
    Task(TaskAction),
    Explore(ExploreAction),
    Ps,
    Kill(KillAction),
    ConnectorConfig(ConnectorConfigAction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BashAction {
    pub command: String,
    /// Per-command timeout requested by the model
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadAction {
    pub path: String,
    /// 1-based first line to return
    pub offset: Option<usize>,
    /// Maximum number of lines to return
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditAction {
    pub path: String,
    pub search: String,
    pub replace: String,
    pub replace_all: bool,
}

/// One search/replace pair of a multi-edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditPair {
    pub search: String,
    pub replace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiEditAction {
    pub path: String,
    pub edits: Vec<EditPair>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAction {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAction {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobAction {
    pub pattern: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepAction {
    pub pattern: String,
    pub path: Option<String>,
    /// Glob restricting which files are searched
    pub include: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsAction {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitAction {
    /// Arguments after `git`
    pub args: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchAction {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchAction {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatAction {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypecheckAction {
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAction {
    pub name: String,
    pub cron: String,
    pub task: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyAction {
    pub message: String,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillAction {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillInstallAction {
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanAction {
    pub plan: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAction {
    pub description: String,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExploreAction {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillAction {
    pub pid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfigAction {
    pub platform: String,
    pub key: String,
    pub value: String,
}

/// Host capability an action is dispatched to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FileSystem,
    Shell,
    Processes,
    Search,
    Web,
    WebSearch,
    DevTools,
    Notifier,
    Scheduler,
    Skills,
    Delegate,
    Connectors,
}

impl Action {
    /// The tag name this action was written with
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Bash(_) => "bash",
            Action::Read(_) => "read",
            Action::Edit(_) => "edit",
            Action::MultiEdit(_) => "multi-edit",
            Action::Write(_) => "write",
            Action::Create(_) => "create",
            Action::Glob(_) => "glob",
            Action::Grep(_) => "grep",
            Action::Ls(_) => "ls",
            Action::Git(_) => "git",
            Action::Fetch(_) => "fetch",
            Action::Search(_) => "search",
            Action::Format(_) => "format",
            Action::Typecheck(_) => "typecheck",
            Action::Schedule(_) => "schedule",
            Action::Notify(_) => "notify",
            Action::Skill(_) => "skill",
            Action::SkillInstall(_) => "skill-install",
            Action::Plan(_) => "plan",
            Action::Task(_) => "task",
            Action::Explore(_) => "explore",
            Action::Ps => "ps",
            Action::Kill(_) => "kill",
            Action::ConnectorConfig(_) => "connector-config",
        }
    }

    /// Capability that must be wired for this action to run
    pub fn capability(&self) -> Capability {
        match self {
            Action::Read(_)
            | Action::Edit(_)
            | Action::MultiEdit(_)
            | Action::Write(_)
            | Action::Create(_) => Capability::FileSystem,
            Action::Bash(_) | Action::Git(_) => Capability::Shell,
            Action::Ps | Action::Kill(_) => Capability::Processes,
            Action::Glob(_) | Action::Grep(_) | Action::Ls(_) => Capability::Search,
            Action::Fetch(_) => Capability::Web,
            Action::Search(_) => Capability::WebSearch,
            Action::Format(_) | Action::Typecheck(_) => Capability::DevTools,
            Action::Notify(_) => Capability::Notifier,
            Action::Schedule(_) => Capability::Scheduler,
            Action::Skill(_) | Action::SkillInstall(_) => Capability::Skills,
            Action::Plan(_) | Action::Task(_) | Action::Explore(_) => Capability::Delegate,
            Action::ConnectorConfig(_) => Capability::Connectors,
        }
    }

    /// Short human-readable label, used in results and events
    pub fn label(&self) -> String {
        let detail = match self {
            Action::Bash(a) => first_line(&a.command),
            Action::Read(a) => match (a.offset, a.limit) {
                (Some(o), Some(l)) => format!("{} (lines {}-{})", a.path, o, o + l.saturating_sub(1)),
                (Some(o), None) => format!("{} (from line {})", a.path, o),
                (None, Some(l)) => format!("{} (first {} lines)", a.path, l),
                (None, None) => a.path.clone(),
            },
            Action::Edit(a) => a.path.clone(),
            Action::MultiEdit(a) => format!("{} ({} edits)", a.path, a.edits.len()),
            Action::Write(a) => a.path.clone(),
            Action::Create(a) => a.path.clone(),
            Action::Glob(a) => a.pattern.clone(),
            Action::Grep(a) => match &a.path {
                Some(p) => format!("{} in {}", a.pattern, p),
                None => a.pattern.clone(),
            },
            Action::Ls(a) => a.path.clone(),
            Action::Git(a) => first_line(&a.args),
            Action::Fetch(a) => a.url.clone(),
            Action::Search(a) => a.query.clone(),
            Action::Format(a) => a.path.clone(),
            Action::Typecheck(a) => a.path.clone().unwrap_or_default(),
            Action::Schedule(a) => format!("{} ({})", a.name, a.cron),
            Action::Notify(a) => a.target.clone().unwrap_or_default(),
            Action::Skill(a) => a.name.clone(),
            Action::SkillInstall(a) => a.source.clone(),
            Action::Plan(_) => String::new(),
            Action::Task(a) => a.description.clone(),
            Action::Explore(a) => first_line(&a.query),
            Action::Ps => String::new(),
            Action::Kill(a) => a.pid.to_string(),
            Action::ConnectorConfig(a) => format!("{}.{}", a.platform, a.key),
        };
        if detail.is_empty() {
            self.kind().to_string()
        } else {
            format!("{} {}", self.kind(), detail)
        }
    }
}

fn first_line(text: &str) -> String {
    const MAX: usize = 60;
    let line = text.trim().lines().next().unwrap_or("");
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert_eq!(Action::Ps.capability(), Capability::Processes);
        let git = Action::Git(GitAction {
            args: "status".into(),
        });
        assert_eq!(git.capability(), Capability::Shell);
        let search = Action::Search(SearchAction {
            query: "rust".into(),
        });
        assert_eq!(search.capability(), Capability::WebSearch);
        let plan = Action::Plan(PlanAction {
            plan: "1. read".into(),
        });
        assert_eq!(plan.capability(), Capability::Delegate);
    }

    #[test]
    fn test_labels() {
        let read = Action::Read(ReadAction {
            path: "a.ts".into(),
            offset: Some(10),
            limit: Some(5),
        });
        assert_eq!(read.label(), "read a.ts (lines 10-14)");

        let bash = Action::Bash(BashAction {
            command: "cargo test\necho done".into(),
            timeout_secs: None,
        });
        assert_eq!(bash.label(), "bash cargo test");
        assert_eq!(Action::Ps.label(), "ps");
    }

    #[test]
    fn test_serde_tag_is_kebab_case() {
        let action = Action::MultiEdit(MultiEditAction {
            path: "a".into(),
            edits: vec![],
        });
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "multi-edit");
        assert_eq!(action.kind(), "multi-edit");
    }
}
