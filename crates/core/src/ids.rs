//! Identifiers carried in cache protocol request paths.

use std::fmt;
use std::path::{Component, Path};

/// Length of a narinfo identifier (the store path hash part).
pub const NARINFO_ID_LEN: usize = 32;

/// Length of the hash segment in a payload file name.
pub const NAR_HASH_LEN: usize = 52;

fn is_id_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9')
}

/// The 32-character identifier of a narinfo record.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NarInfoId(String);

impl NarInfoId {
    /// Create from a string, validating format.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.len() != NARINFO_ID_LEN {
            return Err(crate::Error::InvalidNarInfoId(format!(
                "narinfo id must be {NARINFO_ID_LEN} chars, got {}",
                id.len()
            )));
        }
        if let Some(c) = id.chars().find(|c| !is_id_char(*c)) {
            return Err(crate::Error::InvalidNarInfoId(format!(
                "invalid character in narinfo id: {c}"
            )));
        }
        Ok(Self(id))
    }

    /// Match a request path of the form `/<id>.narinfo`.
    pub fn from_request_path(path: &str) -> Option<Self> {
        let id = path.strip_prefix('/')?.strip_suffix(".narinfo")?;
        Self::new(id).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NarInfoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NarInfoId({self})")
    }
}

impl fmt::Display for NarInfoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A payload path `nar/<hash>.nar[.<ext>]`, relative to the working directory.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NarPath {
    path: String,
}

impl NarPath {
    /// Parse a relative payload path.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let invalid = |reason: &str| crate::Error::InvalidNarPath(format!("{reason}: {path}"));

        let file = path
            .strip_prefix("nar/")
            .ok_or_else(|| invalid("must start with nar/"))?;
        if !file.is_ascii() {
            return Err(invalid("non-ASCII characters"));
        }
        if file.len() < NAR_HASH_LEN + 4 {
            return Err(invalid("too short"));
        }

        let (hash, rest) = file.split_at(NAR_HASH_LEN);
        if !hash.chars().all(is_id_char) {
            return Err(invalid("invalid hash segment"));
        }

        let ext = rest
            .strip_prefix(".nar")
            .ok_or_else(|| invalid("missing .nar suffix"))?;
        if !ext.is_empty() {
            let compression = ext
                .strip_prefix('.')
                .ok_or_else(|| invalid("unexpected characters after .nar"))?;
            if compression.is_empty() || !compression.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(invalid("invalid compression extension"));
            }
        }

        Ok(Self {
            path: path.to_string(),
        })
    }

    /// Match a request path of the form `/nar/<hash>.nar[.<ext>]`.
    pub fn from_request_path(path: &str) -> Option<Self> {
        Self::parse(path.strip_prefix('/')?).ok()
    }

    /// The relative path (`nar/...`).
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// The hash segment of the file name.
    pub fn hash(&self) -> &str {
        &self.path["nar/".len().."nar/".len() + NAR_HASH_LEN]
    }
}

impl fmt::Debug for NarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NarPath({})", self.path)
    }
}

impl fmt::Display for NarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Check that a narinfo `URL` value is a safe relative path.
///
/// The value is joined onto the working directory, so anything that could
/// climb out of it (`..`, absolute paths, prefixes) is rejected.
pub fn validate_payload_url(url: &str) -> crate::Result<&Path> {
    if url.is_empty() {
        return Err(crate::Error::InvalidPayloadUrl("empty url".to_string()));
    }
    if url.starts_with('/') || url.starts_with('\\') || url.contains("..") {
        return Err(crate::Error::InvalidPayloadUrl(format!(
            "path traversal not allowed: {url}"
        )));
    }
    let path = Path::new(url);
    for component in path.components() {
        if !matches!(component, Component::Normal(_)) {
            return Err(crate::Error::InvalidPayloadUrl(format!(
                "contains unsafe path component: {url}"
            )));
        }
    }
    Ok(path)
}
