//! SHA-256 content hashes and streaming file verification.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Chunk size for streaming file digests (64 KiB).
pub const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Algorithm prefix used by narinfo `FileHash` and `NarHash` fields.
pub const SHA256_PREFIX: &str = "sha256:";

/// SHA-256 digest of a payload file.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Digest an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Self::hasher();
        hasher.update(data);
        hasher.finalize()
    }

    pub fn hasher() -> ContentHasher {
        ContentHasher(Sha256::new())
    }

    /// Parse a 64-character hex digest.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidHash(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let bytes = crate::base32::decode_hex(s)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// The 52-character Nix base32 form used in payload file names.
    pub fn to_nix_base32(&self) -> String {
        crate::base32::encode(&self.0)
    }

    /// Format the way narinfo files declare hashes: `sha256:<nix-base32>`.
    pub fn to_narinfo_string(&self) -> String {
        format!("{SHA256_PREFIX}{}", self.to_nix_base32())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Streaming digest, fed chunk by chunk.
pub struct ContentHasher(Sha256);

impl ContentHasher {
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> ContentHash {
        ContentHash(self.0.finalize().into())
    }
}

/// Hash a file on disk without loading it into memory.
///
/// Every chunk read is an await point, so large payloads do not monopolize
/// a runtime worker.
pub async fn digest_file(path: impl AsRef<Path>) -> crate::Result<ContentHash> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let mut hasher = ContentHash::hasher();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Outcome of comparing a file against a declared narinfo hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashCheck {
    /// The hash as declared by the uploader.
    pub declared: String,
    /// The hash computed from the file, as `sha256:<nix-base32>`.
    pub actual: String,
}

impl HashCheck {
    pub fn is_match(&self) -> bool {
        self.declared == self.actual
    }
}

/// Hash `path` and compare it with a declared `sha256:<nix-base32>` value.
///
/// A mismatch is not an error; callers decide what to do with it.
pub async fn verify_file(path: impl AsRef<Path>, declared: &str) -> crate::Result<HashCheck> {
    let actual = digest_file(path).await?.to_narinfo_string();
    Ok(HashCheck {
        declared: declared.to_string(),
        actual,
    })
}
