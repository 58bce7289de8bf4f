//! Format and typecheck through configured commands

use async_trait::async_trait;
use kite_agent::HandlerError;
use kite_agent::handlers::{DevTools, HandlerResult, Shell};
use std::sync::Arc;

/// Runs `format_command` / `typecheck_command` templates through the shell.
/// `{path}` in a template is replaced with the target path.
pub struct CommandDevTools {
    shell: Arc<dyn Shell>,
    format_command: Option<String>,
    typecheck_command: Option<String>,
}

impl CommandDevTools {
    pub fn new(
        shell: Arc<dyn Shell>,
        format_command: Option<String>,
        typecheck_command: Option<String>,
    ) -> Self {
        Self {
            shell,
            format_command,
            typecheck_command,
        }
    }
}

/// Substitute `{path}`, quoting it for the shell
fn render(template: &str, path: &str) -> String {
    let quoted = format!("'{}'", path.replace('\'', r"'\''"));
    template.replace("{path}", &quoted)
}

#[async_trait]
impl DevTools for CommandDevTools {
    async fn format(&self, path: &str) -> HandlerResult<String> {
        let template = self
            .format_command
            .as_deref()
            .ok_or_else(|| HandlerError::failed("No format_command configured"))?;
        self.shell.exec(&render(template, path), None).await
    }

    async fn typecheck(&self, path: Option<&str>) -> HandlerResult<String> {
        let template = self
            .typecheck_command
            .as_deref()
            .ok_or_else(|| HandlerError::failed("No typecheck_command configured"))?;
        self.shell
            .exec(&render(template, path.unwrap_or(".")), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::shell::LocalShell;

    fn tools(format: Option<&str>, typecheck: Option<&str>) -> CommandDevTools {
        CommandDevTools::new(
            Arc::new(LocalShell::new(std::env::temp_dir())),
            format.map(str::to_string),
            typecheck.map(str::to_string),
        )
    }

    #[test]
    fn test_render_quotes_path() {
        assert_eq!(render("rustfmt {path}", "src/a b.rs"), "rustfmt 'src/a b.rs'");
        assert_eq!(render("fmt {path}", "it's.rs"), r"fmt 'it'\''s.rs'");
        assert_eq!(render("cargo check", "x"), "cargo check");
    }

    #[tokio::test]
    async fn test_format_runs_template() {
        let out = tools(Some("echo formatting {path}"), None)
            .format("src/main.rs")
            .await
            .unwrap();
        assert_eq!(out, "formatting src/main.rs");
    }

    #[tokio::test]
    async fn test_typecheck_defaults_to_project() {
        let out = tools(None, Some("echo checking {path}"))
            .typecheck(None)
            .await
            .unwrap();
        assert_eq!(out, "checking .");
    }

    #[tokio::test]
    async fn test_unconfigured_command_fails() {
        let err = tools(None, None).format("a.rs").await.unwrap_err();
        assert_eq!(err, HandlerError::failed("No format_command configured"));
        assert!(tools(Some("true"), None).typecheck(None).await.is_err());
    }
}
