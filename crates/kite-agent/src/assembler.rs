//! Streaming response assembler.
//!
//! Turns raw content chunks into display deltas that never expose a partial
//! action tag. The whole accumulated text is rescanned on every chunk since
//! a tag may straddle any number of chunks; what has been shown is tracked
//! by a high-water mark and never rewound.

use crate::grammar;

/// Incremental display filter for one model response
#[derive(Debug, Default)]
pub struct StreamAssembler {
    buffer: String,
    /// Length of the display text already emitted
    emitted: usize,
    hide_actions: bool,
}

impl StreamAssembler {
    /// Create an assembler. With `hide_actions`, completed action tags are
    /// removed from the display text as well.
    pub fn new(hide_actions: bool) -> Self {
        Self {
            hide_actions,
            ..Default::default()
        }
    }

    /// Add a chunk and return the newly displayable text (possibly empty)
    pub fn feed(&mut self, chunk: &str) -> String {
        self.buffer.push_str(chunk);
        let safe_len = grammar::pending_tag_start(&self.buffer).unwrap_or(self.buffer.len());
        self.emit_up_to(safe_len)
    }

    /// End of stream: emit whatever remains displayable.
    ///
    /// An action tag that never closed is still withheld when hiding
    /// actions; otherwise the raw remainder is shown.
    pub fn flush(&mut self) -> String {
        let end = if self.hide_actions {
            grammar::pending_tag_start(&self.buffer).unwrap_or(self.buffer.len())
        } else {
            self.buffer.len()
        };
        self.emit_up_to(end)
    }

    /// Everything received so far
    pub fn text(&self) -> &str {
        &self.buffer
    }

    fn emit_up_to(&mut self, end: usize) -> String {
        let display = self.render(&self.buffer[..end]);
        if display.len() <= self.emitted {
            return String::new();
        }
        let delta = display[self.emitted..].to_string();
        self.emitted = display.len();
        delta
    }

    fn render(&self, safe: &str) -> String {
        if self.hide_actions {
            collapse_newlines(&grammar::strip_action_tags(safe))
        } else {
            collapse_newlines(safe)
        }
    }
}

/// Collapse runs of three or more newlines to exactly two
pub fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0;
    for c in text.chars() {
        if c == '\n' {
            run += 1;
            if run > 2 {
                continue;
            }
        } else {
            run = 0;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&str], hide_actions: bool) -> (Vec<String>, String) {
        let mut assembler = StreamAssembler::new(hide_actions);
        let mut deltas = Vec::new();
        for chunk in chunks {
            deltas.push(assembler.feed(chunk));
        }
        deltas.push(assembler.flush());
        let joined = deltas.concat();
        (deltas, joined)
    }

    /// Split `text` into chunks of `size` chars
    fn chunked(text: &str, size: usize) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        chars.chunks(size).map(|c| c.iter().collect()).collect()
    }

    #[test]
    fn test_partial_open_tag_is_withheld() {
        let mut a = StreamAssembler::new(false);
        assert_eq!(a.feed("Let me check <re"), "Let me check ");
        assert_eq!(a.feed("ad path=\"a"), "");
        assert_eq!(a.feed("\"/> done"), "<read path=\"a\"/> done");
    }

    #[test]
    fn test_unterminated_tag_is_withheld_until_closed() {
        let mut a = StreamAssembler::new(false);
        assert_eq!(a.feed("Running:\n<bash>cargo "), "Running:\n");
        assert_eq!(a.feed("test</ba"), "");
        assert_eq!(a.feed("sh>\n"), "<bash>cargo test</bash>\n");
    }

    #[test]
    fn test_hide_actions_strips_completed_tags() {
        let (_, joined) = feed_all(&["Reading.\n<read path=\"x\"/>", "\nOk."], true);
        assert_eq!(joined, "Reading.\n\nOk.");
    }

    #[test]
    fn test_newlines_collapse() {
        let (_, joined) = feed_all(&["a\n\n", "\n\n", "b\n\n\n\nc"], false);
        assert_eq!(joined, "a\n\nb\n\nc");
    }

    #[test]
    fn test_non_action_angle_brackets_pass_through() {
        let mut a = StreamAssembler::new(false);
        assert_eq!(a.feed("if a < b && c > d <div>"), "if a < b && c > d <div>");
    }

    #[test]
    fn test_chunking_invariance() {
        let text = "I'll look first.\n\n\n\n<read path=\"src/main.rs\"/>\nThen <bash timeout=\"30\">cargo test -- --nocapture</bash>\nx < y <edit path=\"a\"><search>1</search><replace>2</replace></edit> end\n";
        for hide in [false, true] {
            let (_, expected) = feed_all(&[text], hide);
            for size in 1..=12 {
                let chunks = chunked(text, size);
                let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
                let (deltas, joined) = feed_all(&refs, hide);
                assert_eq!(joined, expected, "chunk size {} hide {}", size, hide);

                // No prefix ever shows an unterminated tag
                let mut shown = String::new();
                for delta in &deltas[..deltas.len() - 1] {
                    shown.push_str(delta);
                    assert_eq!(grammar::pending_tag_start(&shown), None, "leaked: {:?}", shown);
                }
            }
        }
    }

    #[test]
    fn test_unclosed_tag_at_end() {
        let (_, hidden) = feed_all(&["Done. <bash>rm -rf"], true);
        assert_eq!(hidden, "Done. ");
        let (_, shown) = feed_all(&["Done. <bash>rm -rf"], false);
        assert_eq!(shown, "Done. <bash>rm -rf");
    }
}
