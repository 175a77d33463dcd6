//! Post-build upload trigger.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use ordinary_core::config::UploadConfig;
use std::process::Stdio;

/// POST /upload - push store paths into this cache in the background.
///
/// The body is a whitespace-separated list of store paths. The response
/// is sent without waiting for the push; its outcome is only logged.
pub async fn post_upload(State(state): State<AppState>, body: Body) -> ApiResult<StatusCode> {
    let bytes = axum::body::to_bytes(body, state.config.server.max_upload_body)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read upload body: {e}")))?;
    let paths: Vec<String> = String::from_utf8_lossy(&bytes)
        .split_whitespace()
        .map(str::to_string)
        .collect();

    if paths.is_empty() {
        tracing::debug!("upload request without paths");
        return Ok(StatusCode::NO_CONTENT);
    }

    let upload = state.config.upload.clone();
    let base_url = state.config.server.base_url();
    tokio::spawn(async move {
        push_paths(&upload, &base_url, &paths).await;
    });

    Ok(StatusCode::NO_CONTENT)
}

/// Build the `nix copy` invocation for `paths`.
pub fn copy_command(
    upload: &UploadConfig,
    base_url: &str,
    paths: &[String],
) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(&upload.nix_binary);
    cmd.arg("copy")
        .arg("--to")
        .arg(base_url)
        .args(&upload.extra_args)
        .args(paths)
        .stdin(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

async fn push_paths(upload: &UploadConfig, base_url: &str, paths: &[String]) {
    tracing::debug!(base_url, ?paths, "running nix copy");
    let mut child = match copy_command(upload, base_url, paths).spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(binary = %upload.nix_binary, error = %e, "failed to spawn nix copy");
            return;
        }
    };

    match child.wait().await {
        Ok(status) if status.success() => {
            tracing::info!(count = paths.len(), "uploaded store paths");
        }
        Ok(status) => {
            tracing::warn!(%status, count = paths.len(), "nix copy failed");
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to wait for nix copy");
        }
    }
}
