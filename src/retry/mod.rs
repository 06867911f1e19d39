//! Retry executor for rate-limited producer calls.
//!
//! - Only rate-limit / quota-exhaustion errors are retried
//! - Capped exponential backoff (`base * 2^(n-1)`) with up to 30% additive jitter
//! - Every other error is returned on first occurrence, untouched

pub mod classifier;
pub mod executor;

pub use classifier::{MarkerClassifier, RetryClassify, DEFAULT_RATE_LIMIT_MARKERS};
pub use executor::{
    backoff_delay, with_retry, with_retry_by, with_retry_observed, RetryAttempt, RetryPolicy,
};
