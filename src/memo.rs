//! Cache + retry composition for producer calls.
//!
//! `run` checks the cache, on a miss invokes the producer under the retry
//! policy, stores the result, and returns it. Failed calls are never cached.
//! Concurrent misses on the same key each run the producer; the last write
//! wins.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::digest::short;
use crate::cache::{digest, DurableStore, FileStore, ResponseCache};
use crate::config::Config;
use crate::error::Result;
use crate::retry::{with_retry_by, MarkerClassifier, RetryClassify, RetryPolicy};

/// Memoized, retrying executor for producer calls.
pub struct Memoizer<S: DurableStore + ?Sized = dyn DurableStore> {
    cache: Arc<ResponseCache<S>>,
    policy: RetryPolicy,
    classifier: MarkerClassifier,
    cache_enabled: bool,
}

impl<S: DurableStore + ?Sized> std::fmt::Debug for Memoizer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memoizer")
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .field("classifier", &self.classifier)
            .field("cache_enabled", &self.cache_enabled)
            .finish()
    }
}

impl Memoizer<FileStore> {
    /// Open the configured file store and build a memoizer over it.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = FileStore::open(
            config.cache.resolved_store_path(),
            config.cache.quota_bytes,
        )
        .await?;
        let mut cache = ResponseCache::new(Arc::new(store), config.cache.namespace.clone());
        if let Some(max) = config.cache.max_memory_entries {
            cache = cache.with_max_memory_entries(max);
        }
        Ok(Self::new(Arc::new(cache), config.retry.policy())
            .with_classifier(config.retry.classifier())
            .with_cache_enabled(config.cache.enabled))
    }
}

impl<S: DurableStore + ?Sized> Memoizer<S> {
    pub fn new(cache: Arc<ResponseCache<S>>, policy: RetryPolicy) -> Self {
        Self {
            cache,
            policy,
            classifier: MarkerClassifier::default(),
            cache_enabled: true,
        }
    }

    /// Markers used by [`Memoizer::run`] for errors that cannot be
    /// classified by kind.
    pub fn with_classifier(mut self, classifier: MarkerClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// When disabled, every call goes to the producer (still with retries).
    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn cache(&self) -> &ResponseCache<S> {
        &self.cache
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn classifier(&self) -> &MarkerClassifier {
        &self.classifier
    }

    /// Return the cached result for `key`, or produce, store, and return it.
    pub async fn run<T, E, F, Fut>(&self, key: &str, producer: F) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: RetryClassify + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let markers = &self.classifier;
        self.run_with(key, |err: &E| err.is_rate_limited_with(markers), producer)
            .await
    }

    /// [`Memoizer::run`] with a caller-supplied rate-limit classifier.
    pub async fn run_with<T, E, C, F, Fut>(
        &self,
        key: &str,
        classify: C,
        producer: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: Display,
        C: Fn(&E) -> bool,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if self.cache_enabled {
            if let Some(hit) = self.cache.get_as::<T>(key).await {
                return Ok(hit);
            }
            let digest = digest(key);
            debug!(digest = %short(&digest), "Cache miss, invoking producer");
        } else {
            debug!("Cache disabled, invoking producer");
        }
        let value = with_retry_by(&self.policy, classify, producer).await?;

        if self.cache_enabled {
            self.cache.set_from(key, &value).await;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::providers::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn memoizer() -> Memoizer<MemoryStore> {
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), "memo_");
        Memoizer::new(
            Arc::new(cache),
            RetryPolicy::new(3, Duration::from_millis(100)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_served_from_cache() {
        let memo = memoizer();
        let calls = AtomicU32::new(0);
        let producer = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProviderError>(vec!["frame-1".to_string(), "frame-2".to_string()]) }
        };

        let first = memo.run("k", producer).await.unwrap();
        let second = memo.run("k", producer).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_producer_is_retried_then_cached() {
        let memo = memoizer();
        let calls = AtomicU32::new(0);
        let result = memo
            .run("k", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProviderError::RateLimited("429".into()))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(memo.cache().get_as::<u32>("k").await, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached() {
        let memo = memoizer();
        let result: std::result::Result<u32, _> = memo
            .run("k", || async { Err(ProviderError::Auth("bad key".into())) })
            .await;
        assert_eq!(result, Err(ProviderError::Auth("bad key".into())));
        assert!(memo.cache().get("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_cache_always_produces() {
        let memo = memoizer().with_cache_enabled(false);
        let calls = AtomicU32::new(0);
        for _ in 0..2 {
            memo.run("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ProviderError>(1u8) }
            })
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(memo.cache().memory_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_custom_classifier() {
        let memo = memoizer();
        let calls = AtomicU32::new(0);
        let result = memo
            .run_with(
                "k",
                |e: &String| e.contains("busy"),
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("server busy".to_string())
                        } else {
                            Ok("ok".to_string())
                        }
                    }
                },
            )
            .await;
        assert_eq!(result.as_deref(), Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.store_path = Some(tmp.path().join("store.json"));
        config.cache.max_memory_entries = Some(4);

        let memo = Memoizer::open(&config).await.unwrap();
        assert_eq!(memo.cache().namespace(), "studio_cache_");
        assert_eq!(memo.policy().max_retries, 5);
        assert_eq!(memo.classifier(), &MarkerClassifier::default());
        memo.cache().set("k", serde_json::json!(1)).await;
        assert!(tmp.path().join("store.json").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_uses_configured_markers() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.store_path = Some(tmp.path().join("store.json"));
        config.retry.max_retries = 2;
        config.retry.rate_limit_markers = vec!["overloaded".into()];

        let memo = Memoizer::open(&config).await.unwrap();
        let calls = AtomicU32::new(0);
        let result: std::result::Result<u32, ProviderError> = memo
            .run("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Unknown("model overloaded".into())) }
            })
            .await;

        assert_eq!(result, Err(ProviderError::Unknown("model overloaded".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "1 initial + 2 retries");
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_markers_replace_defaults() {
        let memo = memoizer().with_classifier(MarkerClassifier::new(["overloaded"]));
        let calls = AtomicU32::new(0);
        let result: std::result::Result<u32, ProviderError> = memo
            .run("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Unknown("too many requests".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
