//! System prompt rendering

use crate::action::Capability;
use crate::handlers::HandlerRegistry;

/// Default personality line
pub const DEFAULT_PERSONALITY: &str =
    "You are kite, an autonomous coding agent working in the user's terminal.";

/// Facts about the machine the agent runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub working_dir: String,
    pub os: String,
    pub date: String,
}

impl Environment {
    /// Describe the current process environment
    pub fn current() -> Self {
        Self {
            working_dir: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string()),
            os: std::env::consts::OS.to_string(),
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
        }
    }
}

/// One line of the action reference per wired capability
const REFERENCE: &[(Capability, &str)] = &[
    (
        Capability::FileSystem,
        "<read path=\"src/main.rs\"/> read a file (optional offset=\"N\" limit=\"N\")\n\
         <edit path=\"f\"><search>exact old text</search><replace>new text</replace></edit> \
         replace text (add replace-all to change every match)\n\
         <multi-edit path=\"f\"><edit><search>..</search><replace>..</replace></edit>...</multi-edit> \
         several replacements, all or nothing\n\
         <write path=\"f\">full content</write> overwrite a file\n\
         <create path=\"f\">full content</create> create a new file",
    ),
    (
        Capability::Shell,
        "<bash>command</bash> run a shell command (optional timeout=\"secs\")\n\
         <git>status</git> run git",
    ),
    (
        Capability::Processes,
        "<ps/> list background processes\n<kill pid=\"123\"/> stop one",
    ),
    (
        Capability::Search,
        "<glob pattern=\"**/*.rs\"/> find files\n\
         <grep pattern=\"regex\" path=\"src\" include=\"*.rs\"/> search file contents\n\
         <ls path=\"dir\"/> list a directory",
    ),
    (Capability::Web, "<fetch url=\"https://...\"/> download a page"),
    (Capability::WebSearch, "<search query=\"...\"/> search the web"),
    (
        Capability::DevTools,
        "<format path=\"f\"/> format a file\n<typecheck/> type-check the project",
    ),
    (
        Capability::Notifier,
        "<notify target=\"name\">message</notify> send a notification",
    ),
    (
        Capability::Scheduler,
        "<schedule name=\"n\" cron=\"0 9 * * *\">task</schedule> schedule a recurring task",
    ),
    (
        Capability::Skills,
        "<skill name=\"n\"/> load a skill\n<skill-install source=\"url\"/> install one",
    ),
    (
        Capability::Delegate,
        "<plan>steps</plan> record a plan\n\
         <task description=\"short\">full instructions</task> hand a sub-task to a helper agent\n\
         <explore>question</explore> have a helper agent investigate the code base",
    ),
    (
        Capability::Connectors,
        "<connector-config platform=\"p\" key=\"k\" value=\"v\"/> configure a connector",
    ),
];

/// Render the full system message
pub fn build_system_prompt(
    personality: &str,
    registry: &HandlerRegistry,
    project_context: Option<&str>,
    env: &Environment,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(personality.trim());
    prompt.push_str("\n\n");

    let available: Vec<&str> = REFERENCE
        .iter()
        .filter(|(capability, _)| registry.supports(*capability))
        .map(|(_, text)| *text)
        .collect();

    if available.is_empty() {
        prompt.push_str("No actions are available. Answer from your own knowledge.\n");
    } else {
        prompt.push_str("You act by writing action tags directly in your reply. Available actions:\n\n");
        for text in available {
            prompt.push_str(text);
            prompt.push('\n');
        }
        prompt.push_str(
            "\nRules:\n\
             - Write tags directly, never inside code fences or backticks.\n\
             - Prefer one action per reply and wait for its result.\n\
             - Never write file contents as plain text; use the actions.\n\
             - Read each file at most once per request; pick offset and limit up front.\n\
             - When the task is done, reply with a short summary and no action tags.\n",
        );
        if registry.supports(Capability::FileSystem) {
            prompt.push_str("- Read a file before editing it and copy the search text exactly.\n");
        }
    }

    prompt.push_str(&format!(
        "\nWorking directory: {}\nOS: {}\nDate: {}\n",
        env.working_dir, env.os, env.date
    ));

    if let Some(context) = project_context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n# Project Context\n\n");
        prompt.push_str(context);
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFs;
    use std::sync::Arc;

    fn env() -> Environment {
        Environment {
            working_dir: "/work".into(),
            os: "linux".into(),
            date: "2025-01-01".into(),
        }
    }

    #[test]
    fn test_only_wired_actions_are_listed() {
        let registry = HandlerRegistry::new().with_fs(Arc::new(MemoryFs::default()));
        let prompt = build_system_prompt(DEFAULT_PERSONALITY, &registry, None, &env());
        assert!(prompt.contains("<read path="));
        assert!(!prompt.contains("<bash>"));
        assert!(!prompt.contains("<notify"));
        assert!(prompt.contains("Working directory: /work"));
    }

    #[test]
    fn test_empty_registry() {
        let prompt = build_system_prompt("Be brief.", &HandlerRegistry::new(), None, &env());
        assert!(prompt.starts_with("Be brief."));
        assert!(prompt.contains("No actions are available"));
    }

    #[test]
    fn test_project_context_is_appended() {
        let prompt = build_system_prompt(
            DEFAULT_PERSONALITY,
            &HandlerRegistry::new(),
            Some("Use tabs.\n"),
            &env(),
        );
        assert!(prompt.ends_with("# Project Context\n\nUse tabs.\n"));
    }
}
