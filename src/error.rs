//! Crate-wide error type.

use thiserror::Error;

use crate::cache::StoreError;
use crate::providers::ProviderError;
use crate::retry::{MarkerClassifier, RetryClassify};

/// Errors surfaced by studiocache.
///
/// Cache misses and swallowed durable-tier faults never appear here; they are
/// recovered inside [`crate::cache::ResponseCache`].
#[derive(Debug, Error)]
pub enum StudioError {
    /// The model provider (producer) failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Durable store failure surfaced outside the cache (e.g. opening a store).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, StudioError>;

impl RetryClassify for StudioError {
    fn is_rate_limited(&self) -> bool {
        match self {
            StudioError::Provider(err) => err.is_rate_limited(),
            _ => false,
        }
    }

    fn is_rate_limited_with(&self, markers: &MarkerClassifier) -> bool {
        match self {
            StudioError::Provider(err) => err.is_rate_limited_with(markers),
            _ => false,
        }
    }
}
