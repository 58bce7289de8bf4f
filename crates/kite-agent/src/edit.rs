//! Search/replace edit engine.
//!
//! Pure functions over file content; the executor does the I/O.

use similar::{ChangeTag, TextDiff};

use crate::action::EditPair;

/// Result of applying one search/replace to some content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edit changed the content
    Applied(String),
    /// The content already reflects the edit; nothing to write
    AlreadyApplied,
    /// The search text does not occur
    NotFound,
    /// The search text occurs more than once and `replace_all` was not set
    Ambiguous(usize),
}

/// Apply a single search/replace.
///
/// An edit is already applied when the replacement leaves the content
/// unchanged, or when the search text is gone but the replacement text is
/// present (the edit ran on an earlier turn).
pub fn apply_edit(content: &str, search: &str, replace: &str, replace_all: bool) -> EditOutcome {
    if search.is_empty() {
        return EditOutcome::NotFound;
    }

    let occurrences = content.matches(search).count();
    if occurrences == 0 {
        if !replace.is_empty() && content.contains(replace) {
            return EditOutcome::AlreadyApplied;
        }
        return EditOutcome::NotFound;
    }
    if occurrences > 1 && !replace_all {
        return EditOutcome::Ambiguous(occurrences);
    }

    let updated = if replace_all {
        content.replace(search, replace)
    } else {
        content.replacen(search, replace, 1)
    };
    if updated == content {
        EditOutcome::AlreadyApplied
    } else {
        EditOutcome::Applied(updated)
    }
}

/// Result of applying a group of edits to one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultiEditOutcome {
    /// At least one pair changed the content
    Applied {
        content: String,
        applied: usize,
        already_applied: usize,
    },
    /// Every pair was already applied
    AlreadyApplied,
    /// Pair `index` (0-based) was not found; nothing may be written
    NotFound { index: usize },
    /// Pair `index` matched `count` times; nothing may be written
    Ambiguous { index: usize, count: usize },
}

/// Apply a group of edits to one file, all or nothing.
///
/// Every search text must occur in `content` as it was before the group.
/// A pair whose search text is gone but whose replacement is present counts
/// as already applied only when the whole group is. Mixed with pending
/// pairs it is not found and nothing is written.
pub fn apply_multi_edit(content: &str, edits: &[EditPair]) -> MultiEditOutcome {
    let mut stale = None;
    for (index, pair) in edits.iter().enumerate() {
        if !pair.search.is_empty() && content.contains(pair.search.as_str()) {
            continue;
        }
        if pair.replace.is_empty() || !content.contains(pair.replace.as_str()) {
            return MultiEditOutcome::NotFound { index };
        }
        stale.get_or_insert(index);
    }
    match stale {
        Some(_) if edits.iter().all(|pair| !content.contains(pair.search.as_str())) => {
            return MultiEditOutcome::AlreadyApplied;
        }
        Some(index) => return MultiEditOutcome::NotFound { index },
        None => {}
    }

    let mut current = content.to_string();
    let mut applied = 0;
    let mut already_applied = 0;
    for (index, pair) in edits.iter().enumerate() {
        // An earlier pair may have consumed this one's search text
        if !current.contains(pair.search.as_str()) {
            return MultiEditOutcome::NotFound { index };
        }
        match apply_edit(&current, &pair.search, &pair.replace, false) {
            EditOutcome::Applied(next) => {
                current = next;
                applied += 1;
            }
            EditOutcome::AlreadyApplied => already_applied += 1,
            EditOutcome::NotFound => return MultiEditOutcome::NotFound { index },
            EditOutcome::Ambiguous(count) => return MultiEditOutcome::Ambiguous { index, count },
        }
    }

    if applied == 0 {
        MultiEditOutcome::AlreadyApplied
    } else {
        MultiEditOutcome::Applied {
            content: current,
            applied,
            already_applied,
        }
    }
}

const MAX_DIFF_LINES: usize = 40;

/// Compact line diff showing only changed lines and one line of context
pub fn render_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = Vec::new();

    for group in diff.grouped_ops(1) {
        if !output.is_empty() {
            output.push("...\n".to_string());
        }
        for op in group {
            for change in diff.iter_changes(&op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };
                let mut line = format!("{}{}", sign, change);
                if change.missing_newline() {
                    line.push('\n');
                }
                output.push(line);
            }
        }
    }

    if output.len() > MAX_DIFF_LINES {
        let hidden = output.len() - MAX_DIFF_LINES;
        output.truncate(MAX_DIFF_LINES);
        output.push(format!("... ({} more diff lines)\n", hidden));
    }

    output.concat()
}
