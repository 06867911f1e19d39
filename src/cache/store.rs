//! Durable key-value store abstraction backing the cache's persistent tier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a [`DurableStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the write because it is full.
    #[error("Store quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The store cannot be reached or has been made unreadable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// String-keyed durable store shared by everything in the process.
///
/// Implementations must tolerate unrelated ids living alongside the cache's
/// namespaced ids.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read the value stored under `id`, or `None` if absent.
    async fn read(&self, id: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `id`, replacing any previous value.
    async fn write(&self, id: &str, value: &str) -> StoreResult<()>;

    /// Remove `id`. Removing an absent id is not an error.
    async fn remove(&self, id: &str) -> StoreResult<()>;

    /// Every id currently held, in no particular order.
    async fn list_ids(&self) -> StoreResult<Vec<String>>;

    /// Backend identifier for logs.
    fn backend_type(&self) -> &str;
}

/// Bytes an entry occupies against a capacity limit.
pub(crate) fn entry_size(id: &str, value: &str) -> usize {
    id.len() + value.len()
}

/// In-memory [`DurableStore`] with an optional byte capacity and switchable
/// read/write faults.
///
/// Useful as a test double and for embedding without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    capacity_bytes: Option<usize>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once `id.len() + value.len()` summed over all
    /// entries would exceed `capacity_bytes`.
    pub fn with_capacity_bytes(capacity_bytes: usize) -> Self {
        Self {
            capacity_bytes: Some(capacity_bytes),
            ..Self::default()
        }
    }

    /// Make every `read` and `list_ids` fail with [`StoreError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every `write` fail with [`StoreError::QuotaExceeded`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of ids held.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("memory store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronous peek used by tests and diagnostics.
    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .lock()
            .expect("memory store lock poisoned")
            .contains_key(id)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn read(&self, id: &str) -> StoreResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".into()));
        }
        Ok(self
            .entries
            .lock()
            .expect("memory store lock poisoned")
            .get(id)
            .cloned())
    }

    async fn write(&self, id: &str, value: &str) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::QuotaExceeded("writes disabled".into()));
        }
        let mut entries = self.entries.lock().expect("memory store lock poisoned");
        if let Some(capacity) = self.capacity_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != id)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            if used + entry_size(id, value) > capacity {
                return Err(StoreError::QuotaExceeded(format!(
                    "{} of {} bytes used",
                    used, capacity
                )));
            }
        }
        entries.insert(id.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, id: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .expect("memory store lock poisoned")
            .remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".into()));
        }
        Ok(self
            .entries
            .lock()
            .expect("memory store lock poisoned")
            .keys()
            .cloned()
            .collect())
    }

    fn backend_type(&self) -> &str {
        "memory"
    }
}
