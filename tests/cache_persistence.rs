//! Two-tier cache behaviour across simulated process restarts.

use std::sync::Arc;

use serde_json::json;
use studiocache::cache::{storage_id, DurableStore, FileStore, ResponseCache, DEFAULT_NAMESPACE};
use tempfile::TempDir;

async fn open_cache(tmp: &TempDir, quota: Option<usize>) -> ResponseCache<FileStore> {
    let store = FileStore::open(tmp.path().join("store.json"), quota)
        .await
        .expect("open store");
    ResponseCache::new(Arc::new(store), DEFAULT_NAMESPACE)
}

#[tokio::test]
async fn test_value_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let payload = json!({
        "image": {"mime": "image/png", "data": "iVBORw0KGgo="},
        "prompt": "a lighthouse at dusk",
    });

    {
        let cache = open_cache(&tmp, None).await;
        cache.set("image:lighthouse", payload.clone()).await;
    }

    let cache = open_cache(&tmp, None).await;
    assert_eq!(cache.memory_len(), 0);
    assert_eq!(cache.get("image:lighthouse").await, Some(payload));
    assert_eq!(cache.stats().durable_hits, 1);
    assert_eq!(cache.memory_len(), 1);
}

#[tokio::test]
async fn test_quota_exceeded_keeps_value_in_memory_only() {
    let tmp = TempDir::new().unwrap();
    let big = json!("x".repeat(4096));

    {
        let cache = open_cache(&tmp, Some(1024)).await;
        cache.set("speech:long", big.clone()).await;
        assert_eq!(cache.get("speech:long").await, Some(big));
        assert_eq!(cache.stats().durable_write_failures, 1);
    }

    // Not persisted, so a fresh process misses.
    let cache = open_cache(&tmp, Some(1024)).await;
    assert!(cache.get("speech:long").await.is_none());
}

#[tokio::test]
async fn test_purge_across_restart_spares_foreign_ids() {
    let tmp = TempDir::new().unwrap();
    {
        let cache = open_cache(&tmp, None).await;
        cache.set("k1", json!("v1")).await;
        cache.set("k2", json!("v2")).await;
        cache
            .store()
            .write("settings:theme", "\"dark\"")
            .await
            .unwrap();
    }

    let cache = open_cache(&tmp, None).await;
    assert_eq!(cache.purge().await, 2);
    assert!(cache.get("k1").await.is_none());

    let store = FileStore::open(tmp.path().join("store.json"), None)
        .await
        .unwrap();
    assert!(store
        .read(&storage_id(DEFAULT_NAMESPACE, "k1"))
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        store.read("settings:theme").await.unwrap().as_deref(),
        Some("\"dark\"")
    );
}

#[tokio::test]
async fn test_namespaces_are_isolated_in_shared_store() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(
        FileStore::open(tmp.path().join("store.json"), None)
            .await
            .unwrap(),
    );
    let chat = ResponseCache::new(Arc::clone(&store), "chat_");
    let tts = ResponseCache::new(Arc::clone(&store), "tts_");

    chat.set("hello", json!("chat reply")).await;
    tts.set("hello", json!("pcm bytes")).await;

    assert_eq!(chat.purge().await, 1);
    assert!(chat.get("hello").await.is_none());
    assert_eq!(tts.get("hello").await, Some(json!("pcm bytes")));
}
