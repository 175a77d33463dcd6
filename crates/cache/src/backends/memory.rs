//! In-process cache backend.
//!
//! Snapshots file trees into memory. Used by `ordinaryd --backend memory`
//! and by tests. Unlike the Actions backend, restoring with a different
//! path set than the one saved is an error rather than a miss.

use crate::error::{CacheError, CacheResult};
use crate::traits::{RemoteCache, lookup_order, path_spec};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::instrument;

struct Snapshot {
    path_spec: String,
    files: BTreeMap<PathBuf, Bytes>,
}

/// Cache backend keeping every entry in memory.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Snapshot>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Whether an entry exists under `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }
}

/// Read every regular file below `root` (or `root` itself if it is a file).
async fn read_tree(root: &Path, files: &mut BTreeMap<PathBuf, Bytes>) -> CacheResult<()> {
    let mut pending = vec![root.to_path_buf()];
    while let Some(path) = pending.pop() {
        let meta = fs::metadata(&path).await?;
        if meta.is_dir() {
            let mut dir = fs::read_dir(&path).await?;
            while let Some(entry) = dir.next_entry().await? {
                pending.push(entry.path());
            }
        } else if meta.is_file() {
            let data = fs::read(&path).await?;
            files.insert(path, Bytes::from(data));
        }
    }
    Ok(())
}

async fn write_tree(files: &BTreeMap<PathBuf, Bytes>) -> CacheResult<()> {
    for (path, data) in files {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
    }
    Ok(())
}

#[async_trait]
impl RemoteCache for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn available(&self) -> bool {
        true
    }

    #[instrument(skip(self, paths), fields(backend = "memory"))]
    async fn save(&self, paths: &[PathBuf], key: &str) -> CacheResult<()> {
        let mut files = BTreeMap::new();
        for path in paths {
            read_tree(path, &mut files).await?;
        }
        tracing::debug!(files = files.len(), "snapshot captured");

        self.entries.write().await.insert(
            key.to_string(),
            Snapshot {
                path_spec: path_spec(paths),
                files,
            },
        );
        Ok(())
    }

    #[instrument(skip(self, paths), fields(backend = "memory"))]
    async fn restore(
        &self,
        paths: &[PathBuf],
        key: &str,
        fallback_keys: &[String],
    ) -> CacheResult<Option<String>> {
        let spec = path_spec(paths);
        for candidate in lookup_order(key, fallback_keys) {
            // Clone out of the lock so file writes don't hold it.
            let files = {
                let entries = self.entries.read().await;
                let Some(snapshot) = entries.get(candidate) else {
                    continue;
                };
                if snapshot.path_spec != spec {
                    return Err(CacheError::PathMismatch {
                        key: candidate.to_string(),
                    });
                }
                snapshot.files.clone()
            };
            write_tree(&files).await?;
            return Ok(Some(candidate.to_string()));
        }
        Ok(None)
    }
}
