//! Per-request in-memory buffers.
//!
//! A [`ContentQueue`] maps rendered output paths to decoded records
//! pending flush. Queues are identified by an opaque [`QueueId`]
//! handed out by the storage when a buffer is created for a request.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::contentio::DataRecord;

/// Opaque handle to a queue owned by a storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId(Uuid);

impl QueueId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct QueueEntry<T> {
    value: T,
    size_bytes: usize,
}

struct QueueState<T> {
    entries: HashMap<String, QueueEntry<T>>,
    bytes: usize,
}

/// Buffer of decoded records keyed by output path.
pub struct ContentQueue<T> {
    id: QueueId,
    in_format: String,
    out_format: String,
    state: Mutex<QueueState<T>>,
}

impl<T: DataRecord> ContentQueue<T> {
    pub(crate) fn new(id: QueueId, in_format: &str, out_format: &str) -> Self {
        Self {
            id,
            in_format: in_format.to_string(),
            out_format: out_format.to_string(),
            state: Mutex::new(QueueState {
                entries: HashMap::new(),
                bytes: 0,
            }),
        }
    }

    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn in_format(&self) -> &str {
        &self.in_format
    }

    pub fn out_format(&self) -> &str {
        &self.out_format
    }

    /// Insert a batch; duplicate paths replace the existing record.
    pub async fn parse_content(&self, pairs: Vec<(String, T, usize)>) {
        let mut state = self.state.lock().await;
        for (path, value, size_bytes) in pairs {
            if let Some(old) = state.entries.insert(path, QueueEntry { value, size_bytes }) {
                state.bytes -= old.size_bytes;
            }
            state.bytes += size_bytes;
        }
    }

    /// Snapshot of all pending `(path, record)` pairs.
    pub async fn get_all_content(&self) -> Vec<(String, T)> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .map(|(path, entry)| (path.clone(), entry.value.clone()))
            .collect()
    }

    /// Remove specific entries after the backend acknowledged them.
    pub(crate) async fn remove(&self, paths: &[String]) {
        let mut state = self.state.lock().await;
        for path in paths {
            if let Some(entry) = state.entries.remove(path) {
                state.bytes -= entry.size_bytes;
            }
        }
    }

    /// Drop every pending entry.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.bytes = 0;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Serialized footprint of the pending entries.
    pub async fn size_bytes(&self) -> usize {
        self.state.lock().await.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn queue() -> ContentQueue<Value> {
        ContentQueue::new(QueueId::new(), "json", "json")
    }

    #[tokio::test]
    async fn duplicate_path_replaces_and_recounts() {
        let q = queue();
        q.parse_content(vec![("a.json".into(), json!({"v": 1}), 10)])
            .await;
        q.parse_content(vec![("a.json".into(), json!({"v": 2}), 4)])
            .await;
        assert_eq!(q.len().await, 1);
        assert_eq!(q.size_bytes().await, 4);
        let content = q.get_all_content().await;
        assert_eq!(content[0].1, json!({"v": 2}));
    }

    #[tokio::test]
    async fn remove_prunes_only_named_paths() {
        let q = queue();
        q.parse_content(vec![
            ("a.json".into(), json!(1), 1),
            ("b.json".into(), json!(2), 2),
        ])
        .await;
        q.remove(&["a.json".to_string()]).await;
        assert_eq!(q.len().await, 1);
        assert_eq!(q.size_bytes().await, 2);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let q = queue();
        q.parse_content(vec![("a.json".into(), json!(1), 5)]).await;
        q.reset().await;
        assert!(q.is_empty().await);
        assert_eq!(q.size_bytes().await, 0);
    }
}
