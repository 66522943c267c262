//! Single-file JSON key/value store.
//!
//! The whole data set lives in memory and is flushed to disk periodically
//! when dirty. Expired entries are pruned lazily on read and by the
//! maintenance task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::store::{pattern_matches, KvStore};

const FILE_FORMAT_VERSION: &str = "1";

/// Maintenance cadence for [`FileStore`].
#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    /// Path of the JSON database file
    pub path: PathBuf,

    /// How often dirty data is written to disk
    pub flush_interval: Duration,

    /// How often expired entries are dropped
    pub prune_interval: Duration,
}

impl FileStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_interval: Duration::from_secs(5),
            prune_interval: Duration::from_secs(30),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        let path = std::env::var("REGISTRY_PATH").unwrap_or_else(|_| "fftb-registry.json".to_string());
        let mut config = Self::new(path);

        if let Some(secs) = std::env::var("REGISTRY_FLUSH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.flush_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = std::env::var("REGISTRY_PRUNE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.prune_interval = Duration::from_secs(secs);
        }

        config
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Container {
    val: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl Container {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.val.is_empty() && self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FileData {
    version: String,
    data: HashMap<String, Container>,
}

#[derive(Debug, Default)]
struct State {
    data: HashMap<String, Container>,
    dirty: bool,
}

/// JSON file backed [`KvStore`].
pub struct FileStore {
    path: PathBuf,
    state: Mutex<State>,
}

impl FileStore {
    /// Open the store, loading `path` if it exists.
    pub async fn open(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref().to_path_buf();

        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => {
                let file: FileData = serde_json::from_slice(&bytes)?;
                if file.version != FILE_FORMAT_VERSION {
                    warn!(
                        path = %path.display(),
                        version = %file.version,
                        "Unexpected registry file version"
                    );
                }
                file.data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), entries = data.len(), "Opened file registry");

        Ok(Self {
            path,
            state: Mutex::new(State { data, dirty: false }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the data set to disk if anything changed since the last flush.
    pub async fn flush(&self) -> RegistryResult<()> {
        let mut state = self.state.lock().await;
        if !state.dirty {
            return Ok(());
        }

        let file = FileData {
            version: FILE_FORMAT_VERSION.to_string(),
            data: state.data.clone(),
        };
        let bytes = serde_json::to_vec(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        state.dirty = false;
        debug!(path = %self.path.display(), entries = file.data.len(), "Flushed registry");

        Ok(())
    }

    /// Drop expired and empty entries. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let before = state.data.len();
        state.data.retain(|_, c| c.is_live(now));
        let removed = before - state.data.len();

        if removed > 0 {
            state.dirty = true;
            debug!(removed, "Pruned expired registry entries");
        }

        removed
    }

    /// Run flush and prune on their intervals until `cancel` fires, then flush once more.
    pub fn spawn_maintenance(
        store: Arc<Self>,
        config: &FileStoreConfig,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let flush_every = config.flush_interval;
        let prune_every = config.prune_interval;

        tokio::spawn(async move {
            let mut flush_interval = tokio::time::interval(flush_every);
            let mut prune_interval = tokio::time::interval(prune_every);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = flush_interval.tick() => {
                        if let Err(e) = store.flush().await {
                            warn!(error = %e, "Failed to flush registry");
                        }
                    }
                    _ = prune_interval.tick() => {
                        store.prune().await;
                    }
                }
            }

            if let Err(e) = store.flush().await {
                warn!(error = %e, "Failed to flush registry on shutdown");
            }
            info!("Registry maintenance stopped");
        })
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> RegistryResult<String> {
        let now = Utc::now();
        let state = self.state.lock().await;

        state
            .data
            .get(key)
            .filter(|c| c.is_live(now))
            .map(|c| c.val.clone())
            .ok_or_else(|| RegistryError::not_found(key))
    }

    async fn set(&self, key: &str, value: String) -> RegistryResult<()> {
        let mut state = self.state.lock().await;
        state.data.insert(
            key.to_string(),
            Container {
                val: value,
                expires_at: None,
            },
        );
        state.dirty = true;
        Ok(())
    }

    async fn find_all(&self, pattern: &str) -> RegistryResult<Vec<String>> {
        let now = Utc::now();
        let state = self.state.lock().await;

        let mut matched: Vec<(&String, &Container)> = state
            .data
            .iter()
            .filter(|(k, c)| c.is_live(now) && pattern_matches(pattern, k))
            .collect();
        matched.sort_by(|a, b| a.0.cmp(b.0));

        Ok(matched.into_iter().map(|(_, c)| c.val.clone()).collect())
    }

    async fn destroy(&self, key: &str) -> RegistryResult<()> {
        let mut state = self.state.lock().await;
        if state.data.remove(key).is_some() {
            state.dirty = true;
        }
        Ok(())
    }

    async fn expire_at(&self, key: &str, at: DateTime<Utc>) -> RegistryResult<()> {
        let mut state = self.state.lock().await;

        if at <= Utc::now() {
            if state.data.remove(key).is_some() {
                state.dirty = true;
            }
            return Ok(());
        }

        let container = state
            .data
            .get_mut(key)
            .ok_or_else(|| RegistryError::not_found(key))?;
        container.expires_at = Some(at);
        state.dirty = true;

        Ok(())
    }

    async fn persist(&self) -> RegistryResult<()> {
        self.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> FileStore {
        FileStore::open(dir.path().join("registry.json")).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_set_destroy() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.set("v1/segments/a", "one".to_string()).await.unwrap();
        assert_eq!(store.get("v1/segments/a").await.unwrap(), "one");

        store.destroy("v1/segments/a").await.unwrap();
        assert!(store.get("v1/segments/a").await.unwrap_err().is_not_found());

        // Destroying twice is fine
        store.destroy("v1/segments/a").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_value_reads_as_missing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.set("k", String::new()).await.unwrap();
        assert!(store.get("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_find_all_is_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.set("v1/segments/b", "b".to_string()).await.unwrap();
        store.set("v1/segments/a", "a".to_string()).await.unwrap();
        store.set("v1/orders/c", "c".to_string()).await.unwrap();

        let values = store.find_all("v1/segments/*").await.unwrap();
        assert_eq!(values, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_expire_at() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.set("soon", "x".to_string()).await.unwrap();
        store
            .expire_at("soon", Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(store.get("soon").await.unwrap(), "x");

        store
            .expire_at("soon", Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();
        assert!(store.get("soon").await.unwrap_err().is_not_found());

        let err = store
            .expire_at("missing", Utc::now() + ChronoDuration::hours(1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_flush_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("registry.json");

        {
            let store = FileStore::open(&path).await.unwrap();
            store.set("k1", "v1".to_string()).await.unwrap();
            store.set("k2", "v2".to_string()).await.unwrap();
            store.persist().await.unwrap();
        }

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["version"], "1");
        assert_eq!(json["data"]["k1"]["val"], "v1");

        let store = FileStore::open(&path).await.unwrap();
        assert_eq!(store.get("k2").await.unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_flush_skips_clean_store() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.flush().await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_prune_removes_expired() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.set("live", "x".to_string()).await.unwrap();
        store.set("empty", String::new()).await.unwrap();
        {
            let mut state = store.state.lock().await;
            state.data.insert(
                "stale".to_string(),
                Container {
                    val: "y".to_string(),
                    expires_at: Some(Utc::now() - ChronoDuration::seconds(5)),
                },
            );
        }

        assert_eq!(store.prune().await, 2);
        assert_eq!(store.get("live").await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_maintenance_flushes_on_cancel() {
        let dir = TempDir::new().unwrap();
        let config = FileStoreConfig::new(dir.path().join("registry.json"));
        let store = Arc::new(FileStore::open(&config.path).await.unwrap());
        let cancel = CancellationToken::new();

        let handle = FileStore::spawn_maintenance(store.clone(), &config, cancel.clone());
        store.set("k", "v".to_string()).await.unwrap();

        cancel.cancel();
        handle.await.unwrap();

        assert!(config.path.exists());
    }
}
