//! Content-addressed response cache: in-process tier over a durable store.

pub mod digest;
pub mod file_store;
pub mod response_cache;
pub mod store;

pub use digest::{digest, is_storage_id, storage_id, KeyBuilder};
pub use file_store::FileStore;
pub use response_cache::{CacheStats, ResponseCache, DEFAULT_NAMESPACE};
pub use store::{DurableStore, MemoryStore, StoreError, StoreResult};
