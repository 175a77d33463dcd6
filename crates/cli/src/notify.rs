//! Post-build upload notification.

use anyhow::{Context, Result};
use std::time::Duration;

/// Notifications should not hold up a build for long.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the server's `/upload` endpoint.
#[derive(Clone)]
pub struct UploadNotifier {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl UploadNotifier {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Ask the server to push `paths` into the cache.
    ///
    /// Returns once the server has answered. The push itself runs on the
    /// server after the response.
    pub fn notify(&self, paths: &[String]) -> Result<()> {
        let response = self
            .http
            .post(self.url("upload"))
            .body(paths.join(" "))
            .send()
            .context("upload request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            anyhow::bail!("upload rejected ({status}): {body}");
        }
        Ok(())
    }
}

/// Split an `OUT_PATHS` value into store paths.
pub fn parse_out_paths(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
