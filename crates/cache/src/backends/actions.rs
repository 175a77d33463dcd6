//! GitHub Actions cache backend.
//!
//! Speaks the cache service's Twirp JSON API (`ACTIONS_RESULTS_URL`,
//! authenticated with `ACTIONS_RUNTIME_TOKEN`). Entries are gzipped tar
//! archives uploaded to and downloaded from signed blob URLs.
//!
//! The service scopes every entry by a version derived from the path set,
//! so asking for a key saved with different paths is simply a miss.

use crate::archive;
use crate::error::{CacheError, CacheResult};
use crate::traits::{RemoteCache, lookup_order};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Twirp service path under the results URL.
const SERVICE_PATH: &str = "twirp/github.actions.results.api.v1.CacheService";

/// Compression recorded in the entry version.
const COMPRESSION: &str = "gzip";

/// Salt recorded in the entry version.
const VERSION_SALT: &str = "1.0";

/// Environment variable holding the cache service URL.
pub const RESULTS_URL_ENV: &str = "ACTIONS_RESULTS_URL";

/// Environment variable holding the runtime token.
pub const RUNTIME_TOKEN_ENV: &str = "ACTIONS_RUNTIME_TOKEN";

#[derive(Serialize)]
struct CreateCacheEntryRequest<'a> {
    key: &'a str,
    version: &'a str,
}

#[derive(Deserialize)]
struct CreateCacheEntryResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    signed_upload_url: String,
}

#[derive(Serialize)]
struct FinalizeCacheEntryUploadRequest<'a> {
    key: &'a str,
    version: &'a str,
    // int64 fields travel as strings in protobuf JSON.
    size_bytes: String,
}

#[derive(Deserialize)]
struct FinalizeCacheEntryUploadResponse {
    #[serde(default)]
    ok: bool,
}

#[derive(Serialize)]
struct GetCacheEntryDownloadUrlRequest<'a> {
    key: &'a str,
    restore_keys: &'a [String],
    version: &'a str,
}

#[derive(Deserialize)]
struct GetCacheEntryDownloadUrlResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    signed_download_url: String,
    #[serde(default)]
    matched_key: String,
}

/// Twirp error body.
#[derive(Deserialize)]
struct TwirpError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
}

/// Entry version for a path set: SHA-256 over the paths, compression and
/// salt joined by `|`.
pub fn version(paths: &[PathBuf]) -> String {
    let mut components: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    components.push(COMPRESSION.to_string());
    components.push(VERSION_SALT.to_string());
    let digest = Sha256::digest(components.join("|").as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Cache backend for the GitHub Actions cache service.
pub struct ActionsCache {
    http: reqwest::Client,
    results_url: Option<String>,
    token: Option<String>,
    extract_root: PathBuf,
}

impl ActionsCache {
    /// Create a backend. Missing settings fall back to the runner's
    /// environment variables.
    pub fn new(
        results_url: Option<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> CacheResult<Self> {
        let results_url = results_url
            .or_else(|| std::env::var(RESULTS_URL_ENV).ok())
            .filter(|url| !url.is_empty());
        let token = token
            .or_else(|| std::env::var(RUNTIME_TOKEN_ENV).ok())
            .filter(|token| !token.is_empty());
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            results_url,
            token,
            extract_root: PathBuf::from("/"),
        })
    }

    /// Unpack restored archives under `root` instead of `/`.
    pub fn with_extract_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.extract_root = root.into();
        self
    }

    fn credentials(&self) -> CacheResult<(&str, &str)> {
        match (self.results_url.as_deref(), self.token.as_deref()) {
            (Some(url), Some(token)) => Ok((url, token)),
            _ => Err(CacheError::Unavailable(format!(
                "{RESULTS_URL_ENV} and {RUNTIME_TOKEN_ENV} must be set"
            ))),
        }
    }

    /// Call a Twirp method. `Ok(None)` means the service answered with a
    /// Twirp error of the given `tolerated` code.
    async fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        method: &str,
        body: &Req,
        tolerated: &[&str],
    ) -> CacheResult<Option<Resp>> {
        let (base, token) = self.credentials()?;
        let url = format!("{}/{SERVICE_PATH}/{method}", base.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| CacheError::Service {
                    status: status.as_u16(),
                    message: format!("invalid {method} response: {e}"),
                });
        }

        let twirp: Option<TwirpError> = serde_json::from_str(&text).ok();
        if let Some(err) = &twirp
            && tolerated.contains(&err.code.as_str())
        {
            tracing::debug!(method, code = %err.code, msg = %err.msg, "tolerated service error");
            return Ok(None);
        }
        Err(CacheError::Service {
            status: status.as_u16(),
            message: twirp.map(|e| format!("{}: {}", e.code, e.msg)).unwrap_or(text),
        })
    }

    async fn upload_archive(&self, signed_url: &str, archive: &Path, size: u64) -> CacheResult<()> {
        let file = tokio::fs::File::open(archive).await?;
        let body = reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(file));
        let response = self
            .http
            .put(signed_url)
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CacheError::Service {
                status: status.as_u16(),
                message: format!("archive upload failed: {message}"),
            });
        }
        Ok(())
    }

    async fn download_archive(&self, signed_url: &str, dest: &Path) -> CacheResult<u64> {
        let response = self.http.get(signed_url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(CacheError::Service {
                status: status.as_u16(),
                message: "archive download failed".to_string(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }
}

fn temp_archive() -> CacheResult<tempfile::NamedTempFile> {
    Ok(tempfile::Builder::new()
        .prefix("ordinary-")
        .suffix(".tar.gz")
        .tempfile()?)
}

#[async_trait]
impl RemoteCache for ActionsCache {
    fn backend_name(&self) -> &'static str {
        "actions"
    }

    fn available(&self) -> bool {
        self.results_url.is_some() && self.token.is_some()
    }

    #[instrument(skip(self, paths), fields(backend = "actions"))]
    async fn save(&self, paths: &[PathBuf], key: &str) -> CacheResult<()> {
        self.credentials()?;
        let version = version(paths);

        let temp = temp_archive()?;
        let archive_path = temp.path().to_path_buf();
        let sources = paths.to_vec();
        let size = tokio::task::spawn_blocking(move || archive::create(&sources, &archive_path))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))??;

        let created: Option<CreateCacheEntryResponse> = self
            .call(
                "CreateCacheEntry",
                &CreateCacheEntryRequest {
                    key,
                    version: &version,
                },
                &["already_exists"],
            )
            .await?;
        let signed_upload_url = match created {
            Some(resp) if resp.ok && !resp.signed_upload_url.is_empty() => resp.signed_upload_url,
            _ => {
                tracing::info!(key, "cache entry already exists, not saving");
                return Ok(());
            }
        };

        self.upload_archive(&signed_upload_url, temp.path(), size)
            .await?;

        let finalized: Option<FinalizeCacheEntryUploadResponse> = self
            .call(
                "FinalizeCacheEntryUpload",
                &FinalizeCacheEntryUploadRequest {
                    key,
                    version: &version,
                    size_bytes: size.to_string(),
                },
                &[],
            )
            .await?;
        if !finalized.is_some_and(|resp| resp.ok) {
            return Err(CacheError::Service {
                status: 200,
                message: format!("failed to finalize cache entry {key}"),
            });
        }

        tracing::debug!(size, "cache entry saved");
        Ok(())
    }

    #[instrument(skip(self, paths), fields(backend = "actions"))]
    async fn restore(
        &self,
        paths: &[PathBuf],
        key: &str,
        fallback_keys: &[String],
    ) -> CacheResult<Option<String>> {
        self.credentials()?;
        let version = version(paths);

        for candidate in lookup_order(key, fallback_keys) {
            let found: Option<GetCacheEntryDownloadUrlResponse> = self
                .call(
                    "GetCacheEntryDownloadURL",
                    &GetCacheEntryDownloadUrlRequest {
                        key: candidate,
                        restore_keys: &[],
                        version: &version,
                    },
                    &["not_found"],
                )
                .await?;
            let Some(found) = found.filter(|r| r.ok && !r.signed_download_url.is_empty()) else {
                tracing::debug!(key = candidate, "no cache entry");
                continue;
            };

            let temp = temp_archive()?;
            let size = self
                .download_archive(&found.signed_download_url, temp.path())
                .await?;
            tracing::debug!(key = candidate, size, "cache archive downloaded");

            let root = self.extract_root.clone();
            tokio::task::spawn_blocking(move || archive::extract(temp.path(), &root))
                .await
                .map_err(|e| CacheError::Task(e.to_string()))??;

            let matched = if found.matched_key.is_empty() {
                candidate.to_string()
            } else {
                found.matched_key
            };
            return Ok(Some(matched));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_depends_on_path_set() {
        let a = version(&[PathBuf::from("/tmp/a")]);
        let b = version(&[PathBuf::from("/tmp/b")]);
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, version(&[PathBuf::from("/tmp/a")]));
    }

    #[test]
    fn test_version_formula() {
        let expected: String = Sha256::digest(b"/tmp/a|gzip|1.0")
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        assert_eq!(version(&[PathBuf::from("/tmp/a")]), expected);
    }

    #[test]
    fn test_unavailable_without_credentials() {
        let cache = ActionsCache::new(
            Some(String::new()),
            Some("token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!cache.available());
        assert!(matches!(
            cache.credentials(),
            Err(CacheError::Unavailable(_))
        ));
    }
}
