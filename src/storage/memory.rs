//! In-process object engine.
//!
//! Keeps objects in a map; used as the development and test backend
//! where no real blob store is wanted.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Error;
use crate::storage::StorageEngine;

#[derive(Default)]
pub struct MemoryEngine {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    fn proto(&self) -> &str {
        "memory"
    }

    async fn launch_session(&self) -> Result<(), Error> {
        Ok(())
    }

    async fn makedirs(&self, _path: &str) -> Result<(), Error> {
        // The map has no directories.
        Ok(())
    }

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        self.objects
            .write()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, Error> {
        self.objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| Error::storage(format!("no object at '{path}'")))
    }

    async fn exists(&self, path: &str) -> Result<bool, Error> {
        Ok(self.objects.read().await.contains_key(path))
    }

    async fn ls(&self, prefix: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn behaves_like_a_flat_object_store() {
        let engine = MemoryEngine::new();
        engine.launch_session().await.unwrap();
        engine.put("a/b/c.json", b"data").await.unwrap();
        assert!(engine.exists("a/b/c.json").await.unwrap());
        assert_eq!(engine.get("a/b/c.json").await.unwrap(), b"data");
        assert_eq!(engine.ls("a/").await.unwrap(), vec!["a/b/c.json"]);
        assert!(engine.get("missing").await.is_err());
    }
}
