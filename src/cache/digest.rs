//! Content addressing for cache keys.
//!
//! Keys are arbitrary caller-built strings; the storage index is the SHA-256
//! of the key rendered as 64 lowercase hex characters. Durable-tier ids are
//! the namespace prefix followed by that digest.

use sha2::{Digest, Sha256};

/// Length of a rendered digest in hex characters.
pub const DIGEST_HEX_LEN: usize = 64;

/// SHA-256 of `key` as lowercase hex. Stable across process runs.
pub fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Durable-tier identifier for `key` under `namespace`.
pub fn storage_id(namespace: &str, key: &str) -> String {
    namespaced_id(namespace, &digest(key))
}

/// Durable-tier identifier for an already computed digest.
pub(crate) fn namespaced_id(namespace: &str, digest: &str) -> String {
    format!("{}{}", namespace, digest)
}

/// `true` if `id` is `namespace` followed by exactly one rendered digest.
pub fn is_storage_id(namespace: &str, id: &str) -> bool {
    id.strip_prefix(namespace).is_some_and(|rest| {
        rest.len() == DIGEST_HEX_LEN
            && rest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

/// Short digest prefix for log fields.
pub(crate) fn short(digest: &str) -> &str {
    &digest[..8.min(digest.len())]
}

/// Builds an unambiguous cache key from an operation name and its inputs.
///
/// Each part is length-prefixed, so `("a|b", "c")` and `("a", "b|c")` produce
/// different keys.
///
/// ```rust
/// use studiocache::cache::KeyBuilder;
///
/// let key = KeyBuilder::new("tts")
///     .part("Kore")
///     .part("Hello there")
///     .build();
/// assert!(key.starts_with("tts:"));
/// ```
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    key: String,
}

impl KeyBuilder {
    pub fn new(operation: &str) -> Self {
        Self {
            key: format!("{}:", operation),
        }
    }

    /// Append one input.
    pub fn part(mut self, value: impl AsRef<str>) -> Self {
        let value = value.as_ref();
        self.key.push_str(&value.len().to_string());
        self.key.push(':');
        self.key.push_str(value);
        self
    }

    /// Append raw bytes (reference images, PCM buffers) by their digest.
    pub fn bytes(self, value: &[u8]) -> Self {
        let hashed = hex::encode(Sha256::digest(value));
        self.part(hashed)
    }

    /// Append any serializable input by its canonical JSON encoding.
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.part(value.to_string())
    }

    pub fn build(self) -> String {
        self.key
    }
}
