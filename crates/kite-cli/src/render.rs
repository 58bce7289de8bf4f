//! Terminal rendering of agent events

use kite_agent::{ActionResult, AgentEvent, CorrectionKind, StopReason};
use std::io::{self, Write};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::utils::{stop_reason_str, truncate_chars};

/// Print events until the request ends. Response text goes to stdout,
/// everything else to stderr so piped output stays clean.
pub fn spawn_printer(
    mut receiver: broadcast::Receiver<AgentEvent>,
    show_thinking: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Printer lagged, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let done = event.is_terminal();
            print_event(event, show_thinking);
            if done {
                break;
            }
        }
    })
}

fn print_event(event: AgentEvent, show_thinking: bool) {
    match event {
        AgentEvent::TextDelta { delta } => {
            print!("{}", delta);
            io::stdout().flush().ok();
        }
        AgentEvent::ThinkingStart if show_thinking => eprint!("\n[thinking] "),
        AgentEvent::ThinkingDelta { delta } if show_thinking => eprint!("{}", delta),
        AgentEvent::ThinkingEnd if show_thinking => eprintln!(),
        AgentEvent::ActionStart { label } => {
            eprint!("\n[{}...", label);
        }
        AgentEvent::ActionEnd { result } => eprintln!("{}", action_summary(&result)),
        AgentEvent::Correction { kind } => {
            eprintln!("\n[{}]", correction_str(kind));
        }
        AgentEvent::HistoryCompressed { before, after } => {
            eprintln!("[History compressed: {} -> {} messages]", before, after);
        }
        // Reported by the caller from the returned error
        AgentEvent::Error { .. } => println!(),
        AgentEvent::AgentEnd { reason } => {
            println!();
            if reason != StopReason::Done {
                eprintln!("[{}]", stop_reason_str(reason));
            }
        }
        _ => {}
    }
}

/// Closing part of an `[action...` line
fn action_summary(result: &ActionResult) -> String {
    if !result.success {
        let error = result.error.as_deref().unwrap_or("failed");
        return format!(
            " error]\n  {}",
            truncate_chars(error, 120).replace('\n', " ")
        );
    }
    if result.is_already_applied() {
        return " already applied]".to_string();
    }
    let first_line = result.result.lines().next().unwrap_or("");
    if result.result.chars().count() <= 60 && !result.result.contains('\n') {
        format!(" {}]", result.result)
    } else {
        format!(" {}]", truncate_chars(first_line, 50))
    }
}

fn correction_str(kind: CorrectionKind) -> &'static str {
    match kind {
        CorrectionKind::DuplicateRead => "Reminding the model it already read those files",
        CorrectionKind::CodeBlock => "Asking the model to use actions instead of code blocks",
        CorrectionKind::Hallucination => "Asking the model to write code through actions",
        CorrectionKind::EmptyResponse => "Empty response, asking again",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_summary() {
        assert_eq!(action_summary(&ActionResult::ok("bash ls", "a.rs")), " a.rs]");
        assert_eq!(
            action_summary(&ActionResult::ok("read a", "line one\nline two")),
            " line one]"
        );
        assert_eq!(
            action_summary(&ActionResult::failed("read x", "file not found:\nx")),
            " error]\n  file not found: x"
        );
    }

    #[tokio::test]
    async fn test_printer_stops_at_end() {
        let (tx, rx) = broadcast::channel(16);
        let printer = spawn_printer(rx, false);
        tx.send(AgentEvent::AgentStart).unwrap();
        tx.send(AgentEvent::AgentEnd {
            reason: StopReason::Done,
        })
        .unwrap();
        printer.await.unwrap();
    }

    #[tokio::test]
    async fn test_printer_stops_when_channel_closes() {
        let (tx, rx) = broadcast::channel(16);
        let printer = spawn_printer(rx, false);
        drop(tx);
        printer.await.unwrap();
    }
}
