//! Application state shared across handlers.

use ordinary_cache::RemoteCache;
use ordinary_core::NarInfoId;
use ordinary_core::config::AppConfig;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// File name of the narinfo inside an entry directory.
pub const NARINFO_FILE: &str = "narinfo";

/// Scratch directory for payloads not yet bound to a narinfo.
pub const SCRATCH_DIR: &str = "nar";

/// Maps payload URLs (`nar/...`) to the narinfo id that references them.
///
/// Filled on every narinfo lookup or store; lives as long as the process.
#[derive(Default)]
pub struct UrlIndex {
    entries: RwLock<HashMap<String, NarInfoId>>,
}

impl UrlIndex {
    pub async fn register(&self, url: &str, id: &NarInfoId) {
        self.entries
            .write()
            .await
            .insert(url.to_string(), id.clone());
    }

    pub async fn lookup(&self, url: &str) -> Option<NarInfoId> {
        self.entries.read().await.get(url).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Remote keyed cache.
    pub cache: Arc<dyn RemoteCache>,
    /// Payload URL to narinfo id index.
    pub url_index: Arc<UrlIndex>,
    /// Serializes moving payloads from scratch into entry directories.
    pub relocate_lock: Arc<Mutex<()>>,
    /// Cancelled when `/quit` is requested.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: AppConfig, cache: Arc<dyn RemoteCache>) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            url_index: Arc::new(UrlIndex::default()),
            relocate_lock: Arc::new(Mutex::new(())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.config.server.work_dir
    }

    /// Directory holding one cache entry: `<work>/<id>`.
    pub fn entry_dir(&self, id: &NarInfoId) -> PathBuf {
        self.work_dir().join(id.as_str())
    }

    /// Remote cache key for an entry.
    pub fn cache_key(&self, id: &NarInfoId) -> String {
        self.config.server.cache_key(id.as_str())
    }

    /// Create the working and scratch directories.
    pub async fn prepare_work_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(self.work_dir().join(SCRATCH_DIR)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordinary_cache::MemoryCache;

    #[tokio::test]
    async fn test_url_index_register_and_lookup() {
        let index = UrlIndex::default();
        let id = NarInfoId::new("0c2kb5yrl4gfzr1jk7yk6nwpfmxn4ykd").unwrap();
        assert!(index.is_empty().await);

        index.register("nar/a.nar.xz", &id).await;
        assert_eq!(index.lookup("nar/a.nar.xz").await, Some(id));
        assert!(index.lookup("nar/b.nar.xz").await.is_none());
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_entry_layout() {
        let temp = tempfile::tempdir().unwrap();
        let state = AppState::new(
            AppConfig::for_testing(temp.path()),
            Arc::new(MemoryCache::new()),
        );
        let id = NarInfoId::new("0c2kb5yrl4gfzr1jk7yk6nwpfmxn4ykd").unwrap();

        assert_eq!(state.entry_dir(&id), temp.path().join(id.as_str()));
        assert_eq!(state.cache_key(&id), format!("nix0:{id}"));

        state.prepare_work_dir().await.unwrap();
        assert!(temp.path().join(SCRATCH_DIR).is_dir());
    }

    #[test]
    fn test_states_are_independent() {
        let a = AppState::new(AppConfig::for_testing("/tmp/a"), Arc::new(MemoryCache::new()));
        let b = AppState::new(AppConfig::for_testing("/tmp/b"), Arc::new(MemoryCache::new()));
        assert!(!Arc::ptr_eq(&a.url_index, &b.url_index));
    }
}
