//! /usage command - show or reset token usage

use super::CommandResult;
use kite_agent::Agent;

pub struct UsageCommand;

impl UsageCommand {
    pub fn execute(args: &str, agent: &Agent) -> CommandResult {
        match args {
            "" => CommandResult::Message(Self::report(agent)),
            "reset" => CommandResult::ResetUsage,
            other => CommandResult::Message(format!(
                "Unknown argument '{}'. Usage: /usage [reset]",
                other
            )),
        }
    }

    fn report(agent: &Agent) -> String {
        let usage = agent.usage();

        let mut output = String::from("Token Usage\n");
        output.push_str(&"-".repeat(40));
        output.push('\n');
        output.push_str(&format!("Model:       {}\n", agent.config().model));
        output.push_str(&format!("Requests:    {:>8}\n", usage.requests));
        output.push_str(&format!(
            "Prompt:      {:>8}\n",
            format_number(usage.prompt_tokens)
        ));
        output.push_str(&format!(
            "Completion:  {:>8}\n",
            format_number(usage.completion_tokens)
        ));
        output.push_str(&format!(
            "Total:       {:>8}",
            format_number(usage.total_tokens)
        ));
        output
    }
}

fn format_number(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}k", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests_support::agent;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_230), "1.2k");
        assert_eq!(format_number(2_500_000), "2.5M");
    }

    #[tokio::test]
    async fn test_report_after_request() {
        let mut agent = agent();
        agent.prompt("hi").await.unwrap();
        let CommandResult::Message(report) = UsageCommand::execute("", &agent) else {
            panic!("expected a report");
        };
        assert!(report.contains("Requests:           1"));
        assert!(report.contains("1.2k"));
    }

    #[test]
    fn test_bad_argument() {
        assert!(matches!(
            UsageCommand::execute("everything", &agent()),
            CommandResult::Message(m) if m.contains("Usage: /usage [reset]")
        ));
    }
}
