//! Cache inspection and maintenance command handlers.

use anyhow::{Context, Result};

use studiocache::cache::{digest, is_storage_id, storage_id, DurableStore, FileStore};
use studiocache::config::Config;
use studiocache::memo::Memoizer;

/// Handle `studiocache digest <key>`.
pub(crate) fn cmd_digest(config: &Config, key: &str) -> Result<()> {
    println!("digest: {}", digest(key));
    println!("id:     {}", storage_id(&config.cache.namespace, key));
    Ok(())
}

/// Handle `studiocache get <key>`.
pub(crate) async fn cmd_get(config: &Config, key: &str) -> Result<()> {
    let memo = Memoizer::open(config)
        .await
        .with_context(|| "Failed to open response cache")?;
    match memo.cache().get(key).await {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => println!("No cached entry for this key."),
    }
    Ok(())
}

/// Handle `studiocache purge`.
pub(crate) async fn cmd_purge(config: &Config) -> Result<()> {
    let memo = Memoizer::open(config)
        .await
        .with_context(|| "Failed to open response cache")?;
    let removed = memo.cache().purge().await;
    println!(
        "Purged {} cached entr{} from namespace '{}'.",
        removed,
        if removed == 1 { "y" } else { "ies" },
        config.cache.namespace
    );
    Ok(())
}

/// Durable store summary shown by `studiocache stats`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct StoreSummary {
    pub cached_entries: usize,
    pub other_entries: usize,
    pub used_bytes: usize,
}

pub(crate) async fn summarize(store: &FileStore, namespace: &str) -> Result<StoreSummary> {
    let ids = store.list_ids().await?;
    let cached_entries = ids.iter().filter(|id| is_storage_id(namespace, id)).count();
    Ok(StoreSummary {
        cached_entries,
        other_entries: ids.len() - cached_entries,
        used_bytes: store.used_bytes().await,
    })
}

/// Handle `studiocache stats`.
pub(crate) async fn cmd_stats(config: &Config) -> Result<()> {
    let path = config.cache.resolved_store_path();
    let store = FileStore::open(&path, config.cache.quota_bytes)
        .await
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    let summary = summarize(&store, &config.cache.namespace).await?;

    println!("Store:          {}", path.display());
    println!("Namespace:      {}", config.cache.namespace);
    println!("Cached entries: {}", summary.cached_entries);
    println!("Other entries:  {}", summary.other_entries);
    match config.cache.quota_bytes {
        Some(quota) => println!("Used bytes:     {} / {}", summary.used_bytes, quota),
        None => println!("Used bytes:     {}", summary.used_bytes),
    }
    Ok(())
}
