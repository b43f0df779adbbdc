//! Bufferable blob storage.
//!
//! Owns the per-request content queues and the overflow policy. On
//! overflow (or with buffering disabled) pending records are encoded
//! and pushed through the engine; an entry leaves its queue only after
//! the engine acknowledged that object.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::contentio::{CodecRegistry, DataRecord};
use crate::error::Error;
use crate::scheduling::{BufferLimit, BufferStats, Clock, SystemClock};
use crate::storage::{ContentQueue, EngineRegistry, QueueId, StorageEngine};

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    total_objects: usize,
    mem_bytes: usize,
}

/// Buffering storage front over a [`StorageEngine`].
pub struct FsBlobStorage<T: DataRecord> {
    engine: Arc<dyn StorageEngine>,
    codecs: Arc<CodecRegistry<T>>,
    bufferize: bool,
    limit: BufferLimit,
    queues: RwLock<HashMap<QueueId, Arc<ContentQueue<T>>>>,
    by_request: RwLock<HashMap<String, QueueId>>,
    counters: Mutex<Counters>,
    /// Timemark lock: `last_commit` only moves forward under it.
    last_commit: Mutex<NaiveDateTime>,
    /// Storage-wide write lock serializing flushes.
    flush_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl<T: DataRecord> FsBlobStorage<T> {
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry<T>> {
        &self.codecs
    }

    pub fn limit(&self) -> &BufferLimit {
        &self.limit
    }

    /// Open the backend session.
    pub async fn launch_session(&self) -> Result<(), Error> {
        self.engine.launch_session().await
    }

    /// Buffer handle for a request; one queue per request name, reused
    /// across collector cycles.
    pub async fn create_buffer(
        &self,
        request_name: &str,
        in_format: &str,
        out_format: &str,
    ) -> QueueId {
        if let Some(id) = self.by_request.read().await.get(request_name) {
            return *id;
        }
        let mut by_request = self.by_request.write().await;
        if let Some(id) = by_request.get(request_name) {
            return *id;
        }
        let id = QueueId::new();
        let queue = Arc::new(ContentQueue::new(id, in_format, out_format));
        self.queues.write().await.insert(id, queue);
        by_request.insert(request_name.to_string(), id);
        debug!(request = request_name, queue = %id, "buffer created");
        id
    }

    pub async fn queue(&self, id: QueueId) -> Result<Arc<ContentQueue<T>>, Error> {
        self.queues
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::storage(format!("no queue registered under {id}")))
    }

    /// Accept a batch of `(path, record)` pairs for queue `id`,
    /// recompute counters and kick off a detached flush when the limit
    /// overflows. Returns whether a flush was triggered.
    pub async fn parse_content(
        self: Arc<Self>,
        id: QueueId,
        pairs: Vec<(String, T)>,
    ) -> Result<bool, Error> {
        let queue = self.queue(id).await?;
        let mut sized = Vec::with_capacity(pairs.len());
        for (path, value) in pairs {
            let bytes = self.codecs.encode_to_vec(queue.out_format(), &value)?;
            sized.push((path, value, bytes.len()));
        }
        queue.parse_content(sized).await;

        let stats = self.recalc_counters().await;
        {
            let mut last_commit = self.last_commit.lock().await;
            *last_commit = self.clock.now();
        }
        let overflowed = !self.bufferize || self.limit.is_overflowed(&stats);
        if overflowed {
            debug!(
                objects = stats.total_objects,
                mem_mib = stats.mem_alloc_mib,
                "buffer overflowed, scheduling flush"
            );
            let storage = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = storage.merge_all().await {
                    error!(%err, "buffer flush failed");
                }
            });
        }
        Ok(overflowed)
    }

    /// Encode and upload every pending entry of queue `id`, pruning
    /// only the entries the engine acknowledged.
    pub async fn merge_to_backend(&self, id: QueueId) -> Result<(), Error> {
        let _write_guard = self.flush_lock.lock().await;
        self.merge_queue(id).await?;
        self.recalc_counters().await;
        Ok(())
    }

    /// Flush every queue of this storage under the write lock.
    pub async fn merge_all(&self) -> Result<(), Error> {
        let _write_guard = self.flush_lock.lock().await;
        let ids: Vec<QueueId> = self.queues.read().await.keys().copied().collect();
        let mut first_err = None;
        for id in ids {
            if let Err(err) = self.merge_queue(id).await {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        let stats = self.recalc_counters().await;
        info!(pending = stats.total_objects, "buffers merged to backend");
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // Upload one queue's entries; caller holds the flush lock and
    // recomputes counters.
    async fn merge_queue(&self, id: QueueId) -> Result<(), Error> {
        let queue = self.queue(id).await?;
        let snapshot = queue.get_all_content().await;
        if snapshot.is_empty() {
            return Ok(());
        }
        let out_format = queue.out_format().to_string();
        let mut acked: Vec<String> = Vec::with_capacity(snapshot.len());
        let mut first_err: Option<Error> = None;
        for (path, value) in snapshot {
            let result = async {
                let bytes = self.codecs.encode_to_vec(&out_format, &value)?;
                self.engine.makedirs(&path).await?;
                self.engine.put(&path, &bytes).await
            }
            .await;
            match result {
                Ok(()) => acked.push(path),
                Err(err) => {
                    error!(%path, %err, "object upload failed, entry stays buffered");
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        debug!(queue = %id, flushed = acked.len(), "queue merged");
        queue.remove(&acked).await;
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // Recompute storage-wide counters from the queues.
    async fn recalc_counters(&self) -> BufferStats {
        let queues = self.queues.read().await;
        let mut counters = Counters::default();
        for queue in queues.values() {
            counters.total_objects += queue.len().await;
            counters.mem_bytes += queue.size_bytes().await;
        }
        *self.counters.lock().await = counters;
        self.stats_from(counters).await
    }

    async fn stats_from(&self, counters: Counters) -> BufferStats {
        let last_commit = *self.last_commit.lock().await;
        BufferStats {
            total_objects: counters.total_objects,
            mem_alloc_mib: counters.mem_bytes as f64 / (1024.0 * 1024.0),
            since_last_commit: self.clock.now() - last_commit,
        }
    }

    /// Objects currently pending across all queues.
    pub async fn total_objects(&self) -> usize {
        self.counters.lock().await.total_objects
    }

    /// Pending serialized footprint in MiB.
    pub async fn mem_alloc_mib(&self) -> f64 {
        self.counters.lock().await.mem_bytes as f64 / (1024.0 * 1024.0)
    }

    /// List stored objects under a prefix.
    pub async fn ls(&self, prefix: &str) -> Result<Vec<String>, Error> {
        self.engine.ls(prefix).await
    }

    /// Read one stored object back.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>, Error> {
        self.engine.get(path).await
    }
}

/// Start configuring a blob storage.
pub fn define_storage() -> StorageBuilder {
    StorageBuilder::new()
}

/// Builder for [`FsBlobStorage`], mirroring `define_storage(...)
/// .configure(...)`.
pub struct StorageBuilder {
    engines: EngineRegistry,
    clock: Arc<dyn Clock>,
}

impl Default for StorageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self {
            engines: EngineRegistry::with_defaults(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Swap in a custom engine registry (extra protocols).
    pub fn with_engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Assemble the storage: engine by protocol, overflow limit by
    /// kind. Configuration mistakes surface here.
    pub fn configure<T: DataRecord>(
        self,
        codecs: Arc<CodecRegistry<T>>,
        engine_proto: &str,
        engine_params: serde_json::Value,
        bufferize: bool,
        limit_type: &str,
        limit_capacity: f64,
    ) -> Result<Arc<FsBlobStorage<T>>, Error> {
        let engine = self.engines.build(engine_proto, &engine_params)?;
        let limit = if bufferize {
            BufferLimit::from_kind(limit_type, limit_capacity)?
        } else {
            BufferLimit::Unable
        };
        info!(proto = engine_proto, ?limit, bufferize, "storage configured");
        Ok(Arc::new(FsBlobStorage {
            engine,
            codecs,
            bufferize,
            limit,
            queues: RwLock::new(HashMap::new()),
            by_request: RwLock::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
            last_commit: Mutex::new(self.clock.now()),
            flush_lock: Mutex::new(()),
            clock: self.clock,
        }))
    }
}
