//! Deciding which failures are worth retrying.
//!
//! Only rate-limit / quota-exhaustion failures are retried. Typed errors say
//! so through [`RetryClassify`]; opaque errors are sniffed for known markers
//! with a [`MarkerClassifier`].

use std::fmt::Display;

/// Substrings that identify a rate-limit failure in an error's text.
pub const DEFAULT_RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "too many requests",
    "resource_exhausted",
    "resource exhausted",
    "quota",
];

/// Errors that know whether they signal provider throttling.
pub trait RetryClassify {
    fn is_rate_limited(&self) -> bool;

    /// Classify using `markers` for any failure the error cannot place by
    /// kind alone. Errors without such a case ignore the markers.
    fn is_rate_limited_with(&self, markers: &MarkerClassifier) -> bool {
        let _ = markers;
        self.is_rate_limited()
    }
}

/// Case-insensitive substring policy for opaque errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerClassifier {
    markers: Vec<String>,
}

impl Default for MarkerClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_MARKERS.iter().copied())
    }
}

impl MarkerClassifier {
    /// Build from a marker list. Blank markers are dropped since they would
    /// match everything.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// `true` if `text` contains any marker, ignoring case.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.markers.iter().any(|m| text.contains(m.as_str()))
    }

    /// Classify an error by its rendered text.
    pub fn matches_error<E: Display + ?Sized>(&self, err: &E) -> bool {
        self.matches(&err.to_string())
    }
}
