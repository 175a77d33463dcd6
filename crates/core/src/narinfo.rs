//! Narinfo parsing for Nix compatibility.
//!
//! The proxy never re-serializes narinfo: the bytes received on PUT are the
//! bytes served on GET. Parsing only exists to validate uploads and to find
//! the payload a record points at.

use std::collections::HashMap;

/// Field holding the relative location of the payload.
pub const URL_FIELD: &str = "URL";

/// Field holding the hash of the (possibly compressed) payload file.
pub const FILE_HASH_FIELD: &str = "FileHash";

/// Parsed narinfo fields. Keys may repeat, so each maps to its values in
/// the order they appeared.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NarInfoFields {
    fields: HashMap<String, Vec<String>>,
}

impl NarInfoFields {
    /// Parse narinfo text.
    ///
    /// Each line is split on the first `": "`; lines without that separator
    /// are ignored rather than rejected.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut fields: HashMap<String, Vec<String>> = HashMap::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once(": ") {
                fields
                    .entry(key.to_string())
                    .or_default()
                    .push(value.to_string());
            }
        }
        Self { fields }
    }

    /// All values recorded for `key`.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.fields.get(key).map(Vec::as_slice)
    }

    /// The first value recorded for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// The payload URL (`URL` field).
    pub fn url(&self) -> Option<&str> {
        self.first(URL_FIELD)
    }

    /// The declared file hash (`FileHash` field).
    pub fn file_hash(&self) -> Option<&str> {
        self.first(FILE_HASH_FIELD)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Extract the payload URL from narinfo text without a full parse.
///
/// Matches the first line of the form `URL: <value>` with a non-empty value.
pub fn url_of(text: &str) -> Option<&str> {
    text.lines()
        .filter_map(|line| line.strip_prefix("URL: "))
        .find(|value| !value.is_empty())
}
