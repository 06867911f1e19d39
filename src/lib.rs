//! studiocache: memoization and rate-limit retries for generative model calls.
//!
//! Two independent pieces, composed per call by [`memo::Memoizer`]:
//!
//! - [`cache::ResponseCache`]: content-addressed, two-tier (in-process over a
//!   durable store) result cache that never fails a caller for storage faults.
//! - [`retry::with_retry`]: capped exponential backoff with jitter that only
//!   retries rate-limit / quota-exhaustion failures.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use studiocache::cache::{FileStore, ResponseCache};
//! use studiocache::memo::Memoizer;
//! use studiocache::providers::GeminiClient;
//! use studiocache::retry::RetryPolicy;
//!
//! # async fn demo() -> studiocache::Result<()> {
//! let store = FileStore::open("/tmp/studiocache.json", None).await?;
//! let cache = ResponseCache::new(Arc::new(store), "studio_cache_");
//! let memo = Memoizer::new(Arc::new(cache), RetryPolicy::default());
//!
//! let client = GeminiClient::new("api-key");
//! let body = GeminiClient::text_request("Describe a red bicycle");
//! let key = GeminiClient::request_key("gemini-2.0-flash", &body);
//! let response = memo
//!     .run(&key, || client.generate_content("gemini-2.0-flash", &body))
//!     .await?;
//! println!("{:?}", GeminiClient::extract_text(&response));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod memo;
pub mod providers;
pub mod retry;

pub use error::{Result, StudioError};
