//! Capped exponential backoff for rate-limited operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use super::classifier::RetryClassify;

/// How many times, and how patiently, to retry a rate-limited operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following retry.
    pub base_delay: Duration,
    /// Upper bound of the additive jitter, as a fraction of the delay.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(2000),
            jitter_ratio: 0.3,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// Set the jitter fraction, clamped to `[0, 1]`.
    pub fn with_jitter_ratio(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = if jitter_ratio.is_finite() {
            jitter_ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn without_jitter(self) -> Self {
        self.with_jitter_ratio(0.0)
    }
}

/// A retry about to happen: which one, how long until it, and what caused it.
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// 1-based retry index (the first attempt is not a retry).
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'a E,
}

/// Delay before retry `retry` (1-based): `base * 2^(retry-1)` plus up to
/// `jitter_ratio` of that, uniformly.
pub fn backoff_delay(base: Duration, retry: u32, jitter_ratio: f64) -> Duration {
    let factor = 2u32.checked_pow(retry.saturating_sub(1)).unwrap_or(u32::MAX);
    jittered(base.saturating_mul(factor), jitter_ratio)
}

fn jittered(delay: Duration, jitter_ratio: f64) -> Duration {
    if jitter_ratio <= 0.0 {
        return delay;
    }
    let scale = jitter_ratio.min(1.0) * rand::random::<f64>();
    let jitter = Duration::try_from_secs_f64(delay.as_secs_f64() * scale).unwrap_or(Duration::MAX);
    delay.saturating_add(jitter)
}

/// Whole milliseconds in `delay` for log fields, saturating at `u64::MAX`.
fn delay_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Run `operation`, retrying only when its error reports rate limiting.
///
/// Returns the first success, or the first non-retryable error, or the last
/// error once `policy.max_retries` retries are spent. Errors are returned
/// exactly as the operation produced them.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify + Display,
{
    with_retry_observed(policy, E::is_rate_limited, operation, |_| {}).await
}

/// [`with_retry`] with a caller-supplied classifier, for error types that
/// don't implement [`RetryClassify`].
pub async fn with_retry_by<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    classify: C,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    C: Fn(&E) -> bool,
{
    with_retry_observed(policy, classify, operation, |_| {}).await
}

/// Core retry loop; `observer` sees each scheduled retry before its delay.
pub async fn with_retry_observed<F, Fut, T, E, C, O>(
    policy: &RetryPolicy,
    classify: C,
    mut operation: F,
    mut observer: O,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    C: Fn(&E) -> bool,
    O: FnMut(&RetryAttempt<'_, E>),
{
    let mut remaining = policy.max_retries;
    let mut level_delay = policy.base_delay;
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(retries = attempt, "Operation succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !classify(&err) {
            debug!("Operation failed with a non-retryable error: {}", err);
            return Err(err);
        }
        if remaining == 0 {
            warn!(retries = attempt, "Retry budget exhausted: {}", err);
            return Err(err);
        }

        attempt += 1;
        let delay = jittered(level_delay, policy.jitter_ratio);
        warn!(
            attempt,
            max_retries = policy.max_retries,
            delay_ms = delay_ms(delay),
            "Rate limited, backing off: {}",
            err
        );
        observer(&RetryAttempt {
            attempt,
            delay,
            error: &err,
        });
        drop(err);

        sleep(delay).await;
        remaining -= 1;
        level_delay = level_delay.saturating_mul(2);
    }
}
