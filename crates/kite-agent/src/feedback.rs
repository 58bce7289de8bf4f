//! Result feedback: compresses a batch of action results into the user
//! message that continues the loop.

use crate::executor::ActionResult;

/// Instruction appended when every action succeeded
const CONTINUE_DIRECTIVE: &str = "Continue with the next step. When the task is complete, reply \
     with a short final answer and no action tags.";

/// Instruction appended when any action failed
const FAILURE_DIRECTIVE: &str = "One or more actions FAILED. Read the errors above and fix the \
     root cause before doing anything else. Do not restate the task and do not repeat an action \
     that failed the same way.";

/// Shown when filtering left nothing to run
pub const EMPTY_BATCH_NOTE: &str = "Nothing was executed: every action in your last response \
     re-read a file that is already in this conversation. Use the content you already have.";

/// Render results plus notes and a continuation directive, keeping the
/// combined result bodies within `budget` characters.
pub fn format_feedback(results: &[ActionResult], notes: &[&str], budget: usize) -> String {
    let bodies: Vec<String> = results.iter().map(result_body).collect();
    let lengths: Vec<usize> = bodies.iter().map(|b| b.chars().count()).collect();
    let cap = fair_share(&lengths, budget);

    let mut out = String::new();
    for (result, body) in results.iter().zip(&bodies) {
        let status = if result.is_already_applied() {
            "already applied"
        } else if result.success {
            "ok"
        } else {
            "failed"
        };
        out.push_str(&format!("[{}] {}\n", status, result.action));
        let body = match cap {
            Some(cap) => truncate_middle(body, cap),
            None => body.clone(),
        };
        if !body.is_empty() {
            out.push_str(&body);
            if !body.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push('\n');
    }

    for note in notes {
        out.push_str(note);
        out.push_str("\n\n");
    }

    if results.iter().any(|r| !r.success) {
        out.push_str(FAILURE_DIRECTIVE);
    } else {
        out.push_str(CONTINUE_DIRECTIVE);
    }
    out
}

fn result_body(result: &ActionResult) -> String {
    match (&result.error, result.result.is_empty()) {
        (Some(error), true) => format!("Error: {}", error),
        (Some(error), false) => format!("Error: {}\n{}", error, result.result),
        (None, _) => result.result.clone(),
    }
}

/// Largest per-body cap such that the capped lengths fit in `budget`
/// (water-filling: short bodies stay whole, long ones share the rest).
/// `None` when everything already fits.
fn fair_share(lengths: &[usize], budget: usize) -> Option<usize> {
    let total: usize = lengths.iter().sum();
    if total <= budget {
        return None;
    }
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();
    let mut remaining = budget;
    let mut count = sorted.len();
    for len in sorted {
        let share = remaining / count;
        if len > share {
            return Some(share);
        }
        remaining -= len;
        count -= 1;
    }
    Some(budget)
}

/// Keep the head and tail of `text`, which is where command output puts
/// the interesting parts.
fn truncate_middle(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let head = max / 2;
    let tail = max - head;
    let start: String = text.chars().take(head).collect();
    let end: String = text.chars().skip(count - tail).collect();
    format!(
        "{}\n... [{} characters truncated] ...\n{}",
        start,
        count - max,
        end
    )
}
