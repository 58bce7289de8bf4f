//! /history command - show conversation size

use super::CommandResult;
use kite_agent::Agent;
use kite_ai::Role;

pub struct HistoryCommand;

impl HistoryCommand {
    pub fn execute(agent: &Agent) -> CommandResult {
        let messages = agent.messages();
        let count = |role: Role| messages.iter().filter(|m| m.role() == role).count();
        let history = agent.config().history;

        CommandResult::Message(format!(
            "Messages: {} ({} user, {} assistant) plus the system prompt\n\
             Window:   compressed to the newest {} once above {}",
            messages.len().saturating_sub(1),
            count(Role::User),
            count(Role::Assistant),
            history.keep_messages,
            history.max_messages
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests_support::agent;

    #[tokio::test]
    async fn test_counts_messages() {
        let mut agent = agent();
        let CommandResult::Message(before) = HistoryCommand::execute(&agent) else {
            panic!("expected a message");
        };
        assert!(before.starts_with("Messages: 0 (0 user, 0 assistant)"));

        agent.prompt("hello").await.unwrap();
        let CommandResult::Message(after) = HistoryCommand::execute(&agent) else {
            panic!("expected a message");
        };
        assert!(after.starts_with("Messages: 2 (1 user, 1 assistant)"));
        assert!(after.contains("newest 20 once above 40"));
    }
}
