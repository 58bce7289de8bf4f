//! Detectors for known model mistakes.
//!
//! Each guard is a named predicate with a fixed pattern list. They are
//! heuristics and can misfire; the loop logs whenever one fires.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::grammar::{self, TagSpan};
use crate::parser;

/// Kinds of corrective guidance the loop can inject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    /// The model kept re-reading files it already has
    DuplicateRead,
    /// Action tags were wrapped in a code fence or backticks
    CodeBlock,
    /// Source code was written as prose instead of through an action
    Hallucination,
    /// Reasoning arrived but no visible response
    EmptyResponse,
}

impl CorrectionKind {
    /// The corrective user message for this mistake
    pub fn message(&self) -> &'static str {
        match self {
            CorrectionKind::DuplicateRead => {
                "Stop re-reading files. Every file you asked for is already in this conversation; \
                 use that content and move on to the next step."
            }
            CorrectionKind::CodeBlock => {
                "Your action tags were inside a code block, so nothing was executed. \
                 Write the tag directly in your response, not inside a code fence or backticks."
            }
            CorrectionKind::Hallucination => {
                "You wrote source code as plain text, so nothing was changed. Do not invent file \
                 contents: read files with <read>, and change them with <edit>, <write> or <create>."
            }
            CorrectionKind::EmptyResponse => "Your last response was empty. Continue the task.",
        }
    }
}

/// Actions found in one turn, split by whether they were fenced
#[derive(Debug, Default)]
pub struct Extracted {
    /// Actions outside code, in source order
    pub actions: Vec<Action>,
    /// Number of action tags found inside code fences or backticks
    pub fenced: usize,
}

/// Parse actions from `text`, ignoring tags that sit inside a code fence or
/// inline backticks. Those are documentation, not instructions.
pub fn extract_actions(text: &str) -> Extracted {
    let tags = grammar::action_tags(text);
    let fences = fence_regions(text, &tags);
    let mut extracted = Extracted::default();
    for tag in &tags {
        if is_fenced(text, tag, &fences) {
            extracted.fenced += 1;
        } else if let Some(action) = parser::action_from_tag(tag) {
            extracted.actions.push(action);
        }
    }
    extracted
}

/// Code-block mistake: nothing ran, but tags were written inside code
pub fn is_code_block_mistake(extracted: &Extracted) -> bool {
    extracted.actions.is_empty() && extracted.fenced > 0
}

/// Byte ranges between ``` fence markers. Markers inside an action tag
/// (e.g. a markdown file being written) do not count.
fn fence_regions(text: &str, tags: &[TagSpan<'_>]) -> Vec<Range<usize>> {
    let inside_tag = |pos: usize| tags.iter().any(|t| t.start <= pos && pos < t.end);
    let mut markers = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            let pos = offset + (line.len() - trimmed.len());
            if !inside_tag(pos) {
                markers.push(pos);
            }
        }
        offset += line.len();
    }

    let mut regions: Vec<Range<usize>> = markers
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .map(|pair| pair[0]..pair[1])
        .collect();
    // An unclosed fence runs to the end of the text
    if markers.len() % 2 == 1 {
        if let Some(&last) = markers.last() {
            regions.push(last..text.len());
        }
    }
    regions
}

fn is_fenced(text: &str, tag: &TagSpan<'_>, fences: &[Range<usize>]) -> bool {
    if fences.iter().any(|r| r.contains(&tag.start)) {
        return true;
    }
    let before = text[..tag.start].chars().next_back();
    let after = text[tag.end..].chars().next();
    before == Some('`') && after == Some('`')
}

/// Whether the text contains a fenced code block
pub fn has_code_fence(text: &str) -> bool {
    text.lines()
        .any(|l| l.trim_start().starts_with("```") || l.trim_start().starts_with("~~~"))
}

/// Line-anchored patterns for declarations that only appear in source code
static CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // JavaScript / TypeScript
        r"(?m)^\s*(export\s+)?(default\s+)?(async\s+)?function\s*\*?\s*\w+\s*\(",
        r"(?m)^\s*(export\s+)?(const|let|var)\s+\w+\s*=\s*(async\s+)?(\([^)]*\)|\w+)\s*=>",
        r#"(?m)^\s*import\s+[\w{}*,\s]+\s+from\s+['"]"#,
        r"(?m)^\s*(export\s+)?(default\s+)?(abstract\s+)?class\s+\w+[^\n]*\{",
        r"(?m)^\s*(export\s+)?(interface|enum|type)\s+\w+[^\n]*[{=]\s*$",
        // Rust
        r"(?m)^\s*(pub(\([^)]*\))?\s+)?(async\s+)?(unsafe\s+)?fn\s+\w+\s*[<(]",
        r"(?m)^\s*(pub(\([^)]*\))?\s+)?(struct|enum|trait)\s+\w+[^\n;]*\{",
        r"(?m)^\s*impl(<[^>]*>)?\s+[\w:<>]+[^\n]*\{",
        // Python
        r"(?m)^\s*(async\s+)?def\s+\w+\s*\([^)]*\)\s*(->\s*[^:]+)?:\s*$",
        r"(?m)^\s*class\s+\w+(\([^)]*\))?:\s*$",
        // C family / Java / Go
        r#"(?m)^\s*#include\s*[<"]"#,
        r"(?m)^\s*(public|private|protected)\s+(static\s+)?(final\s+)?[\w<>\[\],]+\s+\w+\s*\(",
        r"(?m)^\s*func\s+(\([^)]*\)\s*)?\w+\s*\(",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Hallucination mistake: the text reads like raw source code and has no
/// fenced block (fenced examples in an answer are legitimate).
pub fn looks_like_hallucinated_code(text: &str) -> bool {
    if has_code_fence(text) {
        return false;
    }
    CODE_PATTERNS.iter().any(|re| re.is_match(text))
}

/// Empty-turn mistake: reasoning arrived but nothing visible
pub fn is_empty_turn(text: &str, reasoning: &str) -> bool {
    text.trim().is_empty() && !reasoning.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_code_patterns_compile() {
        assert_eq!(CODE_PATTERNS.len(), 13);
    }

    #[test]
    fn test_hallucinated_function() {
        assert!(looks_like_hallucinated_code("function foo() { return 1; }"));
        assert!(looks_like_hallucinated_code("Here it is:\npub fn main() {\n}\n"));
        assert!(looks_like_hallucinated_code("def run(x):\n    return x\n"));
    }

    #[test]
    fn test_prose_is_not_code() {
        assert!(!looks_like_hallucinated_code(
            "The function foo() now returns 1 and the class Bar is unchanged."
        ));
        assert!(!looks_like_hallucinated_code("All tests pass."));
    }

    #[test]
    fn test_fenced_code_is_legitimate() {
        assert!(!looks_like_hallucinated_code(
            "Example:\n```js\nfunction foo() { return 1; }\n```"
        ));
    }

    #[test]
    fn test_fenced_tags_are_not_actions() {
        let text = "Run this:\n```\n<bash>ls</bash>\n```\n";
        let extracted = extract_actions(text);
        assert!(extracted.actions.is_empty());
        assert_eq!(extracted.fenced, 1);
        assert!(is_code_block_mistake(&extracted));
    }

    #[test]
    fn test_inline_backtick_tags_are_not_actions() {
        let extracted = extract_actions("Use `<read path=\"a\"/>` to read.");
        assert!(extracted.actions.is_empty());
        assert_eq!(extracted.fenced, 1);
    }

    #[test]
    fn test_fence_inside_write_body_does_not_hide_the_write() {
        let text = "<write path=\"README.md\">\n# Demo\n```sh\ncargo run\n```\n</write>\nThen <bash>ls</bash>";
        let extracted = extract_actions(text);
        assert_eq!(extracted.fenced, 0);
        let kinds: Vec<_> = extracted.actions.iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec!["write", "bash"]);
    }

    #[test]
    fn test_mixed_fenced_and_direct() {
        let text = "```\n<bash>rm -rf /</bash>\n```\n<read path=\"a\"/>";
        let extracted = extract_actions(text);
        assert_eq!(extracted.actions.len(), 1);
        assert!(!is_code_block_mistake(&extracted));
    }

    #[test]
    fn test_empty_turn() {
        assert!(is_empty_turn("  \n", "thinking hard"));
        assert!(!is_empty_turn("", ""));
        assert!(!is_empty_turn("answer", "thinking"));
    }
}
