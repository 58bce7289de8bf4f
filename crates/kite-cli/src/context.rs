//! Hierarchical project context loading
//!
//! Context files (AGENTS.md or KITE.md) are collected from:
//! 1. Global: ~/.config/kite/
//! 2. Parent directories: from the repository root down to the working directory
//! 3. The working directory itself
//!
//! Later files take higher priority. The parts are joined and appended to
//! the system prompt.

use std::path::{Path, PathBuf};

/// Names of context files to look for (in order of preference)
const CONTEXT_FILE_NAMES: &[&str] = &["AGENTS.md", "KITE.md"];

/// Load all context files for the current directory
pub fn load_context() -> Option<String> {
    let cwd = std::env::current_dir().ok()?;
    let global = dirs::config_dir().map(|d| d.join("kite"));
    load_context_for(&cwd, global.as_deref())
}

/// Load context for `cwd`, with an optional global directory
pub fn load_context_for(cwd: &Path, global_dir: Option<&Path>) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(global) = global_dir.and_then(load_context_from_dir) {
        parts.push(global);
    }

    for dir in parent_dirs(cwd) {
        if let Some(content) = load_context_from_dir(&dir) {
            parts.push(content);
        }
    }

    if let Some(current) = load_context_from_dir(cwd) {
        parts.push(current);
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n---\n\n"))
    }
}

/// Ancestors of `cwd` from the repository root (or filesystem root) down
/// to its parent
fn parent_dirs(cwd: &Path) -> Vec<PathBuf> {
    let start_dir = find_repo_root(cwd).unwrap_or_else(|| PathBuf::from("/"));

    let mut dirs = Vec::new();
    let mut current = cwd.parent();
    while let Some(dir) = current {
        if !dir.starts_with(&start_dir) {
            break;
        }
        dirs.push(dir.to_path_buf());
        current = dir.parent();
    }
    dirs.reverse();
    dirs
}

/// Find the repository root by looking for a .git directory
fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// First non-empty context file in a directory
fn load_context_from_dir(dir: &Path) -> Option<String> {
    CONTEXT_FILE_NAMES.iter().find_map(|name| {
        let content = std::fs::read_to_string(dir.join(name)).ok()?;
        let content = content.trim();
        (!content.is_empty()).then(|| content.to_string())
    })
}
