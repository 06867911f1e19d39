//! JSON-file-backed [`DurableStore`].
//!
//! All ids live in a single JSON object file, loaded once on open and rewritten
//! atomically (temp file + rename) after every mutation. An optional byte quota
//! mirrors the capacity limit of browser-style local storage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::store::{entry_size, DurableStore, StoreError, StoreResult};

/// Persistent store at a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    quota_bytes: Option<usize>,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file opens empty. A corrupt file also opens empty, with a
    /// warning; it is overwritten on the next successful write.
    pub async fn open(path: impl Into<PathBuf>, quota_bytes: Option<usize>) -> StoreResult<Self> {
        let path = path.into();
        let entries = Self::load_from_disk(&path).await?;
        debug!(path = %path.display(), entries = entries.len(), "Opened durable store");
        Ok(Self {
            path,
            quota_bytes,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes currently counted against the quota.
    pub async fn used_bytes(&self) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(k, v)| entry_size(k, v))
            .sum()
    }

    async fn load_from_disk(path: &Path) -> StoreResult<HashMap<String, String>> {
        match fs::read_to_string(path).await {
            Ok(data) if data.trim().is_empty() => Ok(HashMap::new()),
            Ok(data) => match serde_json::from_str(&data) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!(path = %path.display(), "Durable store file is corrupt, starting empty: {}", e);
                    Ok(HashMap::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StoreError::Unavailable(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn save_to_disk(&self, entries: &HashMap<String, String>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec(entries)?;
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn read(&self, id: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().await.get(id).cloned())
    }

    async fn write(&self, id: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != id)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            if used + entry_size(id, value) > quota {
                return Err(StoreError::QuotaExceeded(format!(
                    "{} would need {} bytes, {} of {} used",
                    self.path.display(),
                    entry_size(id, value),
                    used,
                    quota
                )));
            }
        }

        let previous = entries.insert(id.to_string(), value.to_string());
        if let Err(e) = self.save_to_disk(&entries).await {
            // Keep memory and disk in agreement.
            match previous {
                Some(prev) => entries.insert(id.to_string(), prev),
                None => entries.remove(id),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(previous) = entries.remove(id) {
            if let Err(e) = self.save_to_disk(&entries).await {
                entries.insert(id.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn list_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }

    fn backend_type(&self) -> &str {
        "file"
    }
}
