//! Shared helpers for cache backend tests.

use std::net::TcpListener;
use std::path::{Path, PathBuf};

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Lay out a cache entry the way the server does: `<dir>/narinfo` plus
/// `<dir>/nar/<file>`.
pub fn write_entry(dir: &Path, narinfo: &[u8], nar_name: &str, nar: &[u8]) -> PathBuf {
    std::fs::create_dir_all(dir.join("nar")).unwrap();
    std::fs::write(dir.join("narinfo"), narinfo).unwrap();
    std::fs::write(dir.join("nar").join(nar_name), nar).unwrap();
    dir.to_path_buf()
}
