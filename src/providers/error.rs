//! Provider failure kinds.

use thiserror::Error;

use crate::retry::{MarkerClassifier, RetryClassify};

/// What went wrong talking to a model provider.
///
/// Only [`ProviderError::RateLimited`] is retried. [`ProviderError::Unknown`]
/// carries an unclassified message and falls back to marker sniffing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider server error: {0}")]
    Server(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Unknown(String),
}

impl RetryClassify for ProviderError {
    fn is_rate_limited(&self) -> bool {
        self.is_rate_limited_with(&MarkerClassifier::default())
    }

    fn is_rate_limited_with(&self, markers: &MarkerClassifier) -> bool {
        match self {
            ProviderError::RateLimited(_) => true,
            ProviderError::Unknown(message) => markers.matches(message),
            _ => false,
        }
    }
}

/// Map an HTTP status and error message onto a [`ProviderError`].
pub fn parse_provider_error(status: u16, message: &str) -> ProviderError {
    let message = message.to_string();
    match status {
        429 => ProviderError::RateLimited(message),
        401 | 403 => ProviderError::Auth(message),
        400 | 404 | 413 | 422 => ProviderError::InvalidRequest(message),
        500..=599 => ProviderError::Server(message),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, message)),
    }
}
