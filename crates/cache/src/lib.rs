//! Remote keyed cache backends for ordinary.
//!
//! This crate provides:
//! - The [`RemoteCache`] save/restore-by-key abstraction
//! - A GitHub Actions cache service backend
//! - An in-memory backend for local runs and tests

pub mod archive;
pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{actions::ActionsCache, memory::MemoryCache};
pub use error::{CacheError, CacheResult};
pub use traits::RemoteCache;

use ordinary_core::config::CacheConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a remote cache from configuration.
pub fn from_config(config: &CacheConfig) -> CacheResult<Arc<dyn RemoteCache>> {
    match config {
        CacheConfig::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheConfig::Actions {
            results_url,
            runtime_token,
            timeout_secs,
        } => {
            let backend = ActionsCache::new(
                results_url.clone(),
                runtime_token.clone(),
                Duration::from_secs(*timeout_secs),
            )?;
            Ok(Arc::new(backend))
        }
    }
}
