//! Test fixtures for generating cache entries.

use ordinary_core::ContentHash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique narinfo ids.
static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    data
}

/// Generate a valid narinfo id (32 chars, nix-base32).
#[allow(dead_code)]
pub fn random_narinfo_id() -> String {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    ordinary_core::base32::encode(&seeded_bytes(counter, 20))
}

/// A payload plus the narinfo describing it.
#[allow(dead_code)]
pub struct TestEntry {
    pub id: String,
    pub nar: Vec<u8>,
    /// Relative payload URL, `nar/<hash>.nar.xz`.
    pub url: String,
    pub file_hash: String,
}

#[allow(dead_code)]
impl TestEntry {
    pub fn new(seed: u64, len: usize) -> Self {
        let nar = seeded_bytes(seed, len);
        let hash = ContentHash::compute(&nar);
        Self {
            id: random_narinfo_id(),
            url: format!("nar/{}.nar.xz", hash.to_nix_base32()),
            file_hash: hash.to_narinfo_string(),
            nar,
        }
    }

    pub fn narinfo_path(&self) -> String {
        format!("/{}.narinfo", self.id)
    }

    pub fn nar_path(&self) -> String {
        format!("/{}", self.url)
    }

    /// Narinfo text as `nix copy` would upload it.
    pub fn narinfo(&self) -> String {
        self.narinfo_with_hash(&self.file_hash)
    }

    pub fn narinfo_with_hash(&self, file_hash: &str) -> String {
        format!(
            "StorePath: /nix/store/{id}-hello-2.12\n\
             URL: {url}\n\
             Compression: xz\n\
             FileHash: {file_hash}\n\
             FileSize: {size}\n\
             NarHash: sha256:1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s\n\
             NarSize: 226560\n\
             References: {id}-hello-2.12\n",
            id = self.id,
            url = self.url,
            size = self.nar.len(),
        )
    }
}
