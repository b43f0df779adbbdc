//! Flush behavior against the filesystem engine.

use std::sync::Arc;

use serde_json::{json, Value};

use gatherer::{define_storage, CodecRegistry, FsBlobStorage};

fn fs_storage(root: &std::path::Path, limit_type: &str, capacity: f64) -> Arc<FsBlobStorage<Value>> {
    define_storage()
        .configure(
            Arc::new(CodecRegistry::with_json()),
            "file",
            json!({"root": root.to_string_lossy()}),
            true,
            limit_type,
            capacity,
        )
        .expect("file storage configures")
}

#[tokio::test]
async fn merge_writes_files_and_empties_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let storage = fs_storage(dir.path(), "count", 100.0);
    storage.launch_session().await.unwrap();

    let id = storage.create_buffer("vacancies", "json", "json").await;
    let records = vec![
        ("api/vacancies/a.json".to_string(), json!({"id": 1})),
        ("api/vacancies/b.json".to_string(), json!({"id": 2})),
    ];
    storage.clone().parse_content(id, records).await.unwrap();
    assert_eq!(storage.total_objects().await, 2);

    storage.merge_to_backend(id).await.unwrap();
    let queue = storage.queue(id).await.unwrap();
    assert!(queue.is_empty().await);
    assert_eq!(storage.total_objects().await, 0);

    // The backend holds exactly the serialized bytes of the entries.
    let on_disk = std::fs::read(dir.path().join("api/vacancies/a.json")).unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&on_disk).unwrap(), json!({"id": 1}));
    let listed = storage.ls("api").await.unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn repeated_merge_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let storage = fs_storage(dir.path(), "count", 100.0);
    storage.launch_session().await.unwrap();

    let id = storage.create_buffer("quotes", "json", "json").await;
    storage
        .clone()
        .parse_content(id, vec![("q/one.json".to_string(), json!({"px": 10}))])
        .await
        .unwrap();
    storage.merge_to_backend(id).await.unwrap();
    // Nothing pending: a second merge is a no-op, the stored object stays.
    storage.merge_to_backend(id).await.unwrap();
    let listed = storage.ls("q").await.unwrap();
    assert_eq!(listed, vec!["q/one.json"]);
}

#[tokio::test]
async fn memory_limit_triggers_detached_flush() {
    let dir = tempfile::tempdir().unwrap();
    // 1 KiB worth of capacity expressed in MiB.
    let storage = fs_storage(dir.path(), "memory", 1.0 / 1024.0);
    storage.launch_session().await.unwrap();

    let id = storage.create_buffer("bulk", "json", "json").await;
    let big = json!({"payload": "x".repeat(2048)});
    let flushed = storage
        .clone()
        .parse_content(id, vec![("bulk/blob.json".to_string(), big)])
        .await
        .unwrap();
    assert!(flushed, "a 2 KiB record overflows a 1 KiB memory limit");

    for _ in 0..100 {
        if storage.total_objects().await == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(storage.total_objects().await, 0);
    assert!(dir.path().join("bulk/blob.json").exists());
}
