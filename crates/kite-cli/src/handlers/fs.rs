//! Local file access

use async_trait::async_trait;
use kite_agent::handlers::{FileSystem, HandlerResult};
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::utils::resolve_path;

/// File system rooted at the working directory
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileSystem for LocalFs {
    async fn read_to_string(&self, path: &str) -> HandlerResult<Option<String>> {
        let path = resolve_path(&self.root, path);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, content: &str) -> HandlerResult<()> {
        let path = resolve_path(&self.root, path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        tracing::debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    async fn exists(&self, path: &str) -> HandlerResult<bool> {
        Ok(tokio::fs::try_exists(resolve_path(&self.root, path)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let fs = LocalFs::new(root);
        fs.write("a/b/c.txt", "hello").await.unwrap();
        assert_eq!(fs.read_to_string("a/b/c.txt").await.unwrap().as_deref(), Some("hello"));
        assert!(fs.exists("./a/b/c.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let fs = LocalFs::new(root);
        assert_eq!(fs.read_to_string("nope.rs").await.unwrap(), None);
        assert!(!fs.exists("nope.rs").await.unwrap());
    }

    #[tokio::test]
    async fn test_reading_a_directory_fails() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let fs = LocalFs::new(root);
        std::fs::create_dir_all(root.join("dir")).unwrap();
        assert!(fs.read_to_string("dir").await.is_err());
    }
}
