//! Workspace search: glob, grep and directory listing

use async_trait::async_trait;
use kite_agent::HandlerError;
use kite_agent::handlers::{HandlerResult, Search};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::{display_relative, resolve_path, truncate_chars};

/// Maximum files returned by glob
const GLOB_LIMIT: usize = 100;
/// Maximum matches returned by grep
const GREP_LIMIT: usize = 50;
/// Maximum length of a matching line before truncation
const MAX_LINE_LENGTH: usize = 500;
/// Maximum entries returned by ls
const LIST_LIMIT: usize = 200;

/// Directories never worth searching
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules", "target"];

/// Search rooted at the working directory. Results show paths relative to it.
pub struct LocalSearch {
    root: PathBuf,
}

impl LocalSearch {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn is_skipped(path: &Path) -> bool {
    path.components()
        .any(|c| SKIPPED_DIRS.iter().any(|d| c.as_os_str() == *d))
}

fn glob_files(root: &Path, base: &Path, pattern: &str) -> HandlerResult<String> {
    let full_pattern = base.join(pattern).to_string_lossy().to_string();
    let entries = glob::glob(&full_pattern)
        .map_err(|e| HandlerError::failed(format!("Invalid glob pattern: {}", e)))?;

    let mut results = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => {
                if is_skipped(path.strip_prefix(root).unwrap_or(&path)) {
                    continue;
                }
                results.push(display_relative(root, &path));
                if results.len() >= GLOB_LIMIT {
                    break;
                }
            }
            // Unreadable entries are skipped
            Err(e) => tracing::debug!("Glob entry error: {}", e),
        }
    }

    if results.is_empty() {
        return Ok("No files matched the pattern".to_string());
    }
    let truncated = results.len() >= GLOB_LIMIT;
    let mut output = results.join("\n");
    if truncated {
        output.push_str(&format!("\n\n(showing first {} results)", GLOB_LIMIT));
    }
    Ok(output)
}

fn collect_files(root: &Path, path: &Path, include: Option<&str>) -> HandlerResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(HandlerError::failed(format!(
            "Path does not exist: {}",
            display_relative(root, path)
        )));
    }

    let pattern = path
        .join("**")
        .join(include.unwrap_or("*"))
        .to_string_lossy()
        .to_string();
    let entries = glob::glob(&pattern)
        .map_err(|e| HandlerError::failed(format!("Invalid include pattern: {}", e)))?;

    Ok(entries
        .flatten()
        .filter(|entry| entry.is_file())
        .filter(|entry| !is_skipped(entry.strip_prefix(root).unwrap_or(entry)))
        .collect())
}

fn grep_files(
    root: &Path,
    path: &Path,
    pattern: &str,
    include: Option<&str>,
) -> HandlerResult<String> {
    let regex = regex::Regex::new(pattern)
        .map_err(|e| HandlerError::failed(format!("Invalid regex pattern: {}", e)))?;

    let mut matches = Vec::new();
    'files: for file in collect_files(root, path, include)? {
        // Binary and unreadable files are skipped
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        let display = display_relative(root, &file);
        for (index, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(format!(
                    "{}:{}: {}",
                    display,
                    index + 1,
                    truncate_chars(line, MAX_LINE_LENGTH)
                ));
                if matches.len() >= GREP_LIMIT {
                    break 'files;
                }
            }
        }
    }

    if matches.is_empty() {
        return Ok("No matches found".to_string());
    }
    let truncated = matches.len() >= GREP_LIMIT;
    let mut output = matches.join("\n");
    if truncated {
        output.push_str(&format!("\n\n(showing first {} matches)", GREP_LIMIT));
    }
    Ok(output)
}

fn list_dir(root: &Path, path: &Path) -> HandlerResult<String> {
    if !path.exists() {
        return Err(HandlerError::failed(format!(
            "Path does not exist: {}",
            display_relative(root, path)
        )));
    }
    if !path.is_dir() {
        return Err(HandlerError::failed(format!(
            "Path is not a directory: {}",
            display_relative(root, path)
        )));
    }

    let mut items: Vec<_> = fs::read_dir(path)?.flatten().collect();
    items.sort_by_key(|e| e.file_name());

    let mut entries = Vec::new();
    for entry in items.iter().take(LIST_LIMIT) {
        let name = entry.file_name().to_string_lossy().to_string();
        let line = match entry.metadata() {
            Ok(m) if m.is_dir() => format!("{}/", name),
            Ok(m) => format!("{}\t{}", name, format_size(m.len())),
            Err(_) => name,
        };
        entries.push(line);
    }

    if entries.is_empty() {
        return Ok("(empty directory)".to_string());
    }
    let mut output = entries.join("\n");
    if items.len() > LIST_LIMIT {
        output.push_str(&format!("\n\n(showing first {} of {} entries)", LIST_LIMIT, items.len()));
    }
    Ok(output)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Run blocking directory work off the async runtime
async fn blocking<F>(f: F) -> HandlerResult<String>
where
    F: FnOnce() -> HandlerResult<String> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HandlerError::failed(format!("Search task failed: {}", e)))?
}

#[async_trait]
impl Search for LocalSearch {
    async fn glob(&self, pattern: &str, path: Option<&str>) -> HandlerResult<String> {
        let root = self.root.clone();
        let base = resolve_path(&self.root, path.unwrap_or("."));
        let pattern = pattern.to_string();
        blocking(move || glob_files(&root, &base, &pattern)).await
    }

    async fn grep(
        &self,
        pattern: &str,
        path: Option<&str>,
        include: Option<&str>,
    ) -> HandlerResult<String> {
        let root = self.root.clone();
        let path = resolve_path(&self.root, path.unwrap_or("."));
        let pattern = pattern.to_string();
        let include = include.map(str::to_string);
        blocking(move || grep_files(&root, &path, &pattern, include.as_deref())).await
    }

    async fn list(&self, path: &str) -> HandlerResult<String> {
        let root = self.root.clone();
        let path = resolve_path(&self.root, path);
        blocking(move || list_dir(&root, &path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {\n    run();\n}\n").unwrap();
        fs::write(root.join("src/nested/lib.rs"), "pub fn run() {}\n").unwrap();
        fs::write(root.join("src/notes.txt"), "run the tests\n").unwrap();
        fs::write(root.join("target/debug/out.rs"), "fn run() {}\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_glob_is_relative_and_skips_target() {
        let root = fixture();
        let search = LocalSearch::new(root.path());
        let out = search.glob("**/*.rs", None).await.unwrap();
        let mut lines: Vec<&str> = out.lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["src/main.rs", "src/nested/lib.rs"]);

        let none = search.glob("*.py", Some("src")).await.unwrap();
        assert_eq!(none, "No files matched the pattern");
    }

    #[tokio::test]
    async fn test_grep_with_include() {
        let root = fixture();
        let search = LocalSearch::new(root.path());
        let out = search.grep(r"run\(", Some("src"), Some("*.rs")).await.unwrap();
        assert!(out.contains("src/main.rs:2:     run();"));
        assert!(out.contains("src/nested/lib.rs:1: pub fn run() {}"));
        assert!(!out.contains("notes.txt"));
        assert!(!out.contains("target"));

        let all = search.grep("run", None, None).await.unwrap();
        assert!(all.contains("src/notes.txt:1: run the tests"));
    }

    #[tokio::test]
    async fn test_grep_errors() {
        let root = fixture();
        let search = LocalSearch::new(root.path());
        assert!(search.grep("(", None, None).await.is_err());
        assert!(search.grep("x", Some("missing"), None).await.is_err());
        assert_eq!(
            search.grep("nothing-here", None, None).await.unwrap(),
            "No matches found"
        );
    }

    #[tokio::test]
    async fn test_list() {
        let root = fixture();
        let search = LocalSearch::new(root.path());
        let out = search.list("src").await.unwrap();
        let names: Vec<&str> = out
            .lines()
            .map(|l| l.split('\t').next().unwrap())
            .collect();
        assert_eq!(names, vec!["main.rs", "nested/", "notes.txt"]);
        assert!(search.list("src/main.rs").await.is_err());
        assert!(search.list("nope").await.is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(10), "10B");
        assert_eq!(format_size(2048), "2.0K");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0M");
    }
}
