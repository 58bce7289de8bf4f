//! Shared utilities

use base64::Engine;
use kite_agent::StopReason;
use std::path::{Path, PathBuf};

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Resolve a path given by the model: `~` expands to the home directory,
/// relative paths are taken from `root`.
pub fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let path = path.trim();
    let path = path.strip_prefix("./").unwrap_or(path);
    if path.is_empty() || path == "." {
        return root.to_path_buf();
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    root.join(path)
}

/// Render `path` relative to `root` when it lies inside it
pub fn display_relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Mime type for an image file, from its extension
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    })
}

/// Read an image attachment as base64 data plus mime type
pub fn load_image(path: &Path) -> anyhow::Result<(String, &'static str)> {
    let mime = image_mime_type(path).ok_or_else(|| {
        anyhow::anyhow!("Unsupported image type: {} (use png, jpeg, gif or webp)", path.display())
    })?;
    let bytes = std::fs::read(path)
        .map_err(|e| anyhow::anyhow!("Failed to read image {}: {}", path.display(), e))?;
    Ok((base64::engine::general_purpose::STANDARD.encode(bytes), mime))
}

/// Short description of why a request ended, for display
pub fn stop_reason_str(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Done => "done",
        StopReason::FailFast => "stopped after repeated failures",
        StopReason::IterationLimit => "iteration limit reached",
        StopReason::Timeout => "time limit reached",
        StopReason::EmptyResponse => "model returned no answer",
        StopReason::Aborted => "aborted",
    }
}
