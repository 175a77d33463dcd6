//! Core types and shared logic for the ordinary Nix cache proxy.
//!
//! This crate holds everything the server and CLI agree on:
//! - Nix base32 encoding and SHA-256 file verification
//! - Narinfo parsing and request path identifiers
//! - Shared configuration

pub mod base32;
pub mod config;
pub mod error;
pub mod hash;
pub mod ids;
pub mod narinfo;

pub use config::{AppConfig, CacheConfig, DaemonConfig, HookConfig, ServerConfig, UploadConfig};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher, HashCheck};
pub use ids::{NarInfoId, NarPath, validate_payload_url};
pub use narinfo::NarInfoFields;
