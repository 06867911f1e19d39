//! Two-tier, content-addressed cache for model responses.
//!
//! The in-process tier is a map keyed by the SHA-256 digest of the caller's
//! key. The durable tier is any [`DurableStore`], where entries live under
//! `namespace + digest`. Reads check memory first and warm it on a durable
//! hit. Writes always land in memory; a durable write failure is logged and
//! swallowed. There is no TTL and no eviction unless a memory bound is set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::digest::{digest, is_storage_id, namespaced_id, short};
use super::store::DurableStore;

/// Namespace prefix used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "studio_cache_";

/// A value held in the in-process tier.
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Value,
    /// Logical clock of the last read or write, for the optional LRU bound.
    last_access: u64,
}

#[derive(Debug, Default)]
struct MemoryTier {
    entries: HashMap<String, MemoryEntry>,
    clock: u64,
}

impl MemoryTier {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, digest: &str) -> Option<Value> {
        let now = self.tick();
        let entry = self.entries.get_mut(digest)?;
        entry.last_access = now;
        Some(entry.value.clone())
    }

    fn insert(&mut self, digest: String, value: Value, max_entries: Option<usize>) {
        let now = self.tick();
        if let Some(max) = max_entries {
            while !self.entries.contains_key(&digest) && self.entries.len() >= max {
                if !self.evict_lru() {
                    break;
                }
            }
        }
        self.entries.insert(
            digest,
            MemoryEntry {
                value,
                last_access: now,
            },
        );
    }

    fn evict_lru(&mut self) -> bool {
        let Some(lru) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())
        else {
            return false;
        };
        debug!(digest = %short(&lru), "Evicting LRU in-process cache entry");
        self.entries.remove(&lru);
        true
    }
}

/// Counters describing cache traffic since construction.
#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    durable_write_failures: AtomicU64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by the in-process tier.
    pub memory_hits: u64,
    /// Lookups answered by the durable tier (and warmed into memory).
    pub durable_hits: u64,
    /// Lookups answered by neither tier.
    pub misses: u64,
    /// Calls to `set`.
    pub writes: u64,
    /// `set` calls whose durable write was rejected.
    pub durable_write_failures: u64,
    /// Entries currently in the in-process tier.
    pub memory_entries: usize,
}

/// Content-addressed response cache over an injected durable store.
///
/// ```rust
/// use std::sync::Arc;
/// use studiocache::cache::{MemoryStore, ResponseCache};
///
/// # tokio_test_block_on(async {
/// let cache = ResponseCache::new(Arc::new(MemoryStore::new()), "demo_");
/// cache.set("prompt:hello", serde_json::json!({"text": "hi"})).await;
/// assert_eq!(cache.get("prompt:hello").await, Some(serde_json::json!({"text": "hi"})));
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct ResponseCache<S: DurableStore + ?Sized = dyn DurableStore> {
    store: Arc<S>,
    namespace: String,
    max_memory_entries: Option<usize>,
    memory: Mutex<MemoryTier>,
    counters: Counters,
}

impl<S: DurableStore + ?Sized> std::fmt::Debug for ResponseCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("backend", &self.store.backend_type())
            .field("namespace", &self.namespace)
            .field("max_memory_entries", &self.max_memory_entries)
            .finish()
    }
}

impl<S: DurableStore + ?Sized> ResponseCache<S> {
    /// Create a cache whose durable entries are prefixed with `namespace`.
    pub fn new(store: Arc<S>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            max_memory_entries: None,
            memory: Mutex::new(MemoryTier::default()),
            counters: Counters::default(),
        }
    }

    /// Bound the in-process tier; the least recently used entry is dropped
    /// from memory (not from the durable tier) when full. Clamped to 1.
    pub fn with_max_memory_entries(mut self, max_entries: usize) -> Self {
        self.max_memory_entries = Some(max_entries.max(1));
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The injected durable store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Look up `key`. Returns `None` on a miss; store faults and corrupt
    /// entries count as misses.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let digest = digest(key);

        let cached = self.memory().get(&digest);
        if let Some(value) = cached {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!(digest = %short(&digest), "Cache hit (memory)");
            return Some(value);
        }

        let id = self.durable_id(&digest);
        let raw = match self.store.read(&id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(digest = %short(&digest), "Cache miss");
                return None;
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(digest = %short(&digest), "Durable cache read failed, treating as miss: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => {
                self.memory()
                    .insert(digest.clone(), value.clone(), self.max_memory_entries);
                self.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
                debug!(digest = %short(&digest), "Cache hit (durable), warmed memory tier");
                Some(value)
            }
            Err(e) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                warn!(digest = %short(&digest), "Durable cache entry is corrupt, treating as miss: {}", e);
                None
            }
        }
    }

    /// Look up `key` and deserialize into `T`. A value of the wrong shape is
    /// treated as a miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!("Cached value does not match requested type, ignoring: {}", e);
                None
            }
        }
    }

    /// Store `value` under `key`, overwriting any previous value.
    ///
    /// Never fails: if the durable write is rejected the value stays available
    /// from memory for the rest of the process lifetime.
    pub async fn set(&self, key: &str, value: Value) {
        let digest = digest(key);
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        let serialized = serde_json::to_string(&value);
        self.memory()
            .insert(digest.clone(), value, self.max_memory_entries);

        let raw = match serialized {
            Ok(raw) => raw,
            Err(e) => {
                self.counters
                    .durable_write_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(digest = %short(&digest), "Failed to serialize cache entry, kept in memory only: {}", e);
                return;
            }
        };

        let id = self.durable_id(&digest);
        if let Err(e) = self.store.write(&id, &raw).await {
            self.counters
                .durable_write_failures
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                digest = %short(&digest),
                backend = self.store.backend_type(),
                "Failed to persist cache entry, kept in memory only: {}",
                e
            );
        }
    }

    /// Serialize `value` and store it under `key`. A value that cannot be
    /// represented as JSON is not cached.
    pub async fn set_from<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value).await,
            Err(e) => warn!("Value is not JSON-serializable, not caching: {}", e),
        }
    }

    /// Wipe the in-process tier and every durable entry under this cache's
    /// namespace. Only ids of the form `namespace + digest` are removed;
    /// unrelated durable entries are left alone. With an empty namespace the
    /// durable tier cannot be told apart from other data and is not touched.
    ///
    /// Returns the number of durable entries removed.
    pub async fn purge(&self) -> usize {
        self.clear_memory();

        if self.namespace.is_empty() {
            warn!("Cache has no namespace, durable tier not purged");
            return 0;
        }

        let ids = match self.store.list_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to list durable cache entries, durable tier not purged: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for id in ids.iter().filter(|id| is_storage_id(&self.namespace, id)) {
            match self.store.remove(id).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(id = %id, "Failed to remove durable cache entry: {}", e),
            }
        }
        info!(namespace = %self.namespace, removed, "Purged response cache");
        removed
    }

    /// Drop the in-process tier only, as a process restart would.
    pub fn clear_memory(&self) {
        self.memory().entries.clear();
    }

    /// Entries currently held in memory.
    pub fn memory_len(&self) -> usize {
        self.memory().entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.counters.durable_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            durable_write_failures: self
                .counters
                .durable_write_failures
                .load(Ordering::Relaxed),
            memory_entries: self.memory_len(),
        }
    }

    fn durable_id(&self, digest: &str) -> String {
        namespaced_id(&self.namespace, digest)
    }

    fn memory(&self) -> std::sync::MutexGuard<'_, MemoryTier> {
        self.memory.lock().expect("response cache lock poisoned")
    }
}
