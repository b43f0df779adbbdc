//! Object-store engines and the bufferable storage built on them.

mod blob;
mod local;
mod memory;
mod queue;

pub use blob::{define_storage, FsBlobStorage, StorageBuilder};
pub use local::LocalFsEngine;
pub use memory::MemoryEngine;
pub use queue::{ContentQueue, QueueId};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConfigError, Error};

/// Backend driver for serialized objects.
///
/// Engines deal in opaque byte blobs addressed by `/`-separated paths;
/// everything above them (queues, limits, codecs) is backend-agnostic.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Protocol tag the engine was registered under (`file`, `memory`, ...).
    fn proto(&self) -> &str;

    /// Open or verify the connection; called once per collector cycle.
    async fn launch_session(&self) -> Result<(), Error>;

    /// Ensure the parent location of `path` exists.
    async fn makedirs(&self, path: &str) -> Result<(), Error>;

    async fn put(&self, path: &str, bytes: &[u8]) -> Result<(), Error>;

    async fn get(&self, path: &str) -> Result<Vec<u8>, Error>;

    async fn exists(&self, path: &str) -> Result<bool, Error>;

    /// Object paths under a prefix.
    async fn ls(&self, prefix: &str) -> Result<Vec<String>, Error>;
}

impl std::fmt::Debug for dyn StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine").field("proto", &self.proto()).finish()
    }
}

type EngineFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn StorageEngine>, Error> + Send + Sync>;

/// Map from protocol tag to engine factory. Populated before the
/// supervisor starts; read-only afterwards.
pub struct EngineRegistry {
    factories: HashMap<String, EngineFactory>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the bundled `file` and `memory` engines.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("file", |params| {
            let root = params
                .get("root")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::storage("file engine needs a 'root' parameter"))?;
            Ok(Arc::new(LocalFsEngine::new(root)) as Arc<dyn StorageEngine>)
        });
        registry.register("memory", |_params| {
            Ok(Arc::new(MemoryEngine::new()) as Arc<dyn StorageEngine>)
        });
        registry
    }

    pub fn register(
        &mut self,
        proto: &str,
        factory: impl Fn(&serde_json::Value) -> Result<Arc<dyn StorageEngine>, Error>
            + Send
            + Sync
            + 'static,
    ) {
        self.factories.insert(proto.to_string(), Arc::new(factory));
    }

    pub fn allowed_protocols(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn build(
        &self,
        proto: &str,
        params: &serde_json::Value,
    ) -> Result<Arc<dyn StorageEngine>, Error> {
        let factory = self
            .factories
            .get(proto)
            .ok_or_else(|| ConfigError::UnknownEngineProto(proto.to_string()))?;
        factory(params)
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
