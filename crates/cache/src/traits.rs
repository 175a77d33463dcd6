//! Remote cache trait definition.

use crate::error::CacheResult;
use async_trait::async_trait;
use std::path::PathBuf;

/// A key-addressed store of file trees.
///
/// An entry captures every file below each of `paths` and is restored at
/// the same locations. Entries are scoped by the path set they were saved
/// with; how a lookup with a different path set behaves is up to the
/// backend.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Short name used in logs.
    fn backend_name(&self) -> &'static str;

    /// Whether the backing service can be used at all.
    fn available(&self) -> bool;

    /// Capture the trees under `paths` and store them under `key`.
    async fn save(&self, paths: &[PathBuf], key: &str) -> CacheResult<()>;

    /// Restore the entry stored under `key`, or the first hit among
    /// `fallback_keys`, materializing files at their original paths.
    ///
    /// Returns the key that matched, or `None` on a miss.
    async fn restore(
        &self,
        paths: &[PathBuf],
        key: &str,
        fallback_keys: &[String],
    ) -> CacheResult<Option<String>>;
}

/// Serialized form of a path set, used to scope entries.
pub(crate) fn path_spec(paths: &[PathBuf]) -> String {
    let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    serde_json::to_string(&paths).unwrap_or_default()
}

/// `key` followed by `fallback_keys`, in lookup order.
pub(crate) fn lookup_order<'a>(key: &'a str, fallback_keys: &'a [String]) -> Vec<&'a str> {
    std::iter::once(key)
        .chain(fallback_keys.iter().map(String::as_str))
        .collect()
}
