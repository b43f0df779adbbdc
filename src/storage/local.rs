//! Filesystem-backed object engine.
//!
//! Objects live under a root directory; `/`-separated object paths map
//! onto the native filesystem layout.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::Error;
use crate::storage::StorageEngine;

pub struct LocalFsEngine {
    root: PathBuf,
}

impl LocalFsEngine {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            full.push(part);
        }
        full
    }

    fn relative(&self, full: &Path) -> String {
        full.strip_prefix(&self.root)
            .unwrap_or(full)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[async_trait]
impl StorageEngine for LocalFsEngine {
    fn proto(&self) -> &str {
        "file"
    }

    async fn launch_session(&self) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.root).await?;
        debug!(root = %self.root.display(), "local storage session ready");
        Ok(())
    }

    async fn makedirs(&self, path: &str) -> Result<(), Error> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        tokio::fs::write(self.resolve(path), bytes).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, Error> {
        Ok(tokio::fs::read(self.resolve(path)).await?)
    }

    async fn exists(&self, path: &str) -> Result<bool, Error> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn ls(&self, prefix: &str) -> Result<Vec<String>, Error> {
        let start = self.resolve(prefix);
        if !tokio::fs::try_exists(&start).await? {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            if dir.is_file() {
                files.push(self.relative(&dir));
                continue;
            }
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    files.push(self.relative(&path));
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip_under_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LocalFsEngine::new(dir.path());
        engine.launch_session().await.unwrap();
        engine.makedirs("api/income/file.json").await.unwrap();
        engine.put("api/income/file.json", b"{\"a\":1}").await.unwrap();
        assert!(engine.exists("api/income/file.json").await.unwrap());
        assert_eq!(engine.get("api/income/file.json").await.unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn ls_walks_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LocalFsEngine::new(dir.path());
        engine.launch_session().await.unwrap();
        for path in ["a/one.json", "a/b/two.json", "c/three.json"] {
            engine.makedirs(path).await.unwrap();
            engine.put(path, b"x").await.unwrap();
        }
        let listed = engine.ls("a").await.unwrap();
        assert_eq!(listed, vec!["a/b/two.json", "a/one.json"]);
        assert!(engine.ls("missing").await.unwrap().is_empty());
    }
}
