//! Slash commands for interactive mode

mod history;
mod usage;

pub use history::HistoryCommand;
pub use usage::UsageCommand;

use kite_agent::Agent;

/// Result of executing a slash command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Drop the conversation, keeping the system message
    Clear,
    /// Reset the usage counters
    ResetUsage,
    /// Show a message to the user (not sent to agent)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command. Returns `None` for ordinary input.
pub fn execute_command(input: &str, agent: &Agent) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next().unwrap_or("").to_lowercase();
    let args = parts.next().map(str::trim).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "usage" | "u" => UsageCommand::execute(args, agent),

        "history" => HistoryCommand::execute(agent),

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /usage, /u [reset]   Show token usage, or reset the counters
  /history             Show conversation size
  /clear, /c           Clear conversation history
  /quit, /exit, /q     Exit kite

Press Ctrl-C while a request runs to abort it."#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests_support::agent;

    #[test]
    fn test_plain_input_is_not_a_command() {
        assert_eq!(execute_command("fix the bug", &agent()), None);
    }

    #[test]
    fn test_aliases() {
        let agent = agent();
        assert_eq!(execute_command("/c", &agent), Some(CommandResult::Clear));
        assert_eq!(execute_command("  /EXIT ", &agent), Some(CommandResult::Exit));
        assert_eq!(
            execute_command("/usage reset", &agent),
            Some(CommandResult::ResetUsage)
        );
        assert!(matches!(
            execute_command("/help", &agent),
            Some(CommandResult::Message(m)) if m.contains("/history")
        ));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(
            execute_command("/model gpt", &agent()),
            Some(CommandResult::Unknown("model".to_string()))
        );
    }
}
