//! Configuration: JSON file at `~/.studiocache/config.json`, `.env`, and
//! environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::DEFAULT_NAMESPACE;
use crate::error::{Result, StudioError};
use crate::providers::DEFAULT_GEMINI_MODEL;
use crate::retry::{MarkerClassifier, RetryPolicy, DEFAULT_RATE_LIMIT_MARKERS};

/// Env var naming an alternate config file.
pub const CONFIG_PATH_ENV: &str = "STUDIOCACHE_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub provider: ProviderConfig,
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether callers should consult the cache at all.
    pub enabled: bool,
    /// Prefix of every durable-tier id owned by the cache.
    pub namespace: String,
    /// Durable store file. Defaults to `~/.studiocache/cache/store.json`.
    pub store_path: Option<PathBuf>,
    /// Byte quota for the durable store. `None` means unlimited.
    pub quota_bytes: Option<usize>,
    /// Bound on in-process entries. `None` means unbounded.
    pub max_memory_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            store_path: None,
            quota_bytes: None,
            max_memory_entries: None,
        }
    }
}

impl CacheConfig {
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| Config::dir().join("cache").join("store.json"))
    }
}

/// Retry executor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub jitter_ratio: f64,
    /// Case-insensitive substrings that mark an opaque error as rate limiting.
    pub rate_limit_markers: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2000,
            jitter_ratio: 0.3,
            rate_limit_markers: DEFAULT_RATE_LIMIT_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
            .with_jitter_ratio(self.jitter_ratio)
    }

    pub fn classifier(&self) -> MarkerClassifier {
        MarkerClassifier::new(&self.rate_limit_markers)
    }
}

/// Model provider settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: None,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Config {
    /// `~/.studiocache`
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".studiocache")
    }

    /// Config file path, honouring `STUDIOCACHE_CONFIG`.
    pub fn path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::dir().join("config.json"))
    }

    /// Load `.env`, the config file, and env overrides, then validate.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::load_from_path(&Self::path())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse the file at `path`. A missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).map_err(|e| {
                StudioError::Config(format!("Failed to parse {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(StudioError::Config(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source. Unparseable numbers
    /// are ignored.
    pub fn apply_overrides_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(ns) = var("STUDIOCACHE_NAMESPACE") {
            self.cache.namespace = ns;
        }
        if let Some(path) = var("STUDIOCACHE_STORE_PATH") {
            self.cache.store_path = Some(PathBuf::from(path));
        }
        if let Some(n) = var("STUDIOCACHE_MAX_RETRIES").and_then(|v| v.trim().parse().ok()) {
            self.retry.max_retries = n;
        }
        if let Some(ms) = var("STUDIOCACHE_BASE_DELAY_MS").and_then(|v| v.trim().parse().ok()) {
            self.retry.base_delay_ms = ms;
        }
        if let Some(key) = var("GEMINI_API_KEY").or_else(|| var("GOOGLE_API_KEY")) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = var("STUDIOCACHE_MODEL") {
            self.provider.model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.namespace.is_empty() {
            return Err(StudioError::Config(
                "cache.namespace must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(StudioError::Config(format!(
                "retry.jitter_ratio must be between 0 and 1, got {}",
                self.retry.jitter_ratio
            )));
        }
        if self.retry.classifier().markers().is_empty() {
            return Err(StudioError::Config(
                "retry.rate_limit_markers must contain at least one marker".to_string(),
            ));
        }
        if self.provider.model.trim().is_empty() {
            return Err(StudioError::Config(
                "provider.model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert!(cfg.cache.enabled);
        assert_eq!(cfg.cache.namespace, "studio_cache_");
        assert!(cfg.cache.quota_bytes.is_none());
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.base_delay_ms, 2000);
        assert_eq!(cfg.provider.model, "gemini-2.0-flash");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let cfg = RetryConfig {
            max_retries: 2,
            base_delay_ms: 500,
            jitter_ratio: 0.1,
            ..Default::default()
        };
        let policy = cfg.policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert!((policy.jitter_ratio - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"cache": {"namespace": "ui_"}, "retry": {"max_retries": 1}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.cache.namespace, "ui_");
        assert!(cfg.cache.enabled); // default
        assert_eq!(cfg.retry.max_retries, 1);
        assert_eq!(cfg.retry.base_delay_ms, 2000); // default
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::load_from_path(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(StudioError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STUDIOCACHE_NAMESPACE", "alt_"),
            ("STUDIOCACHE_MAX_RETRIES", "3"),
            ("STUDIOCACHE_BASE_DELAY_MS", "not-a-number"),
            ("GOOGLE_API_KEY", "g-key"),
            ("STUDIOCACHE_MODEL", ""),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        cfg.apply_overrides_from(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(cfg.cache.namespace, "alt_");
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.base_delay_ms, 2000, "bad number ignored");
        assert_eq!(cfg.provider.api_key.as_deref(), Some("g-key"));
        assert_eq!(cfg.provider.model, "gemini-2.0-flash", "blank value ignored");
    }

    #[test]
    fn test_gemini_key_preferred_over_google_key() {
        let mut cfg = Config::default();
        cfg.apply_overrides_from(|name| match name {
            "GEMINI_API_KEY" => Some("gemini".into()),
            "GOOGLE_API_KEY" => Some("google".into()),
            _ => None,
        });
        assert_eq!(cfg.provider.api_key.as_deref(), Some("gemini"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.cache.namespace.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.retry.jitter_ratio = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.retry.rate_limit_markers = vec!["  ".into()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_provider_debug_redacts_key() {
        let cfg = ProviderConfig {
            api_key: Some("secret-key".into()),
            ..Default::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_store_path_override() {
        let cfg = CacheConfig {
            store_path: Some(PathBuf::from("/tmp/x.json")),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_store_path(), PathBuf::from("/tmp/x.json"));
        assert!(CacheConfig::default()
            .resolved_store_path()
            .ends_with("cache/store.json"));
    }
}
