//! Nix binary cache protocol endpoints.
//!
//! Narinfo and payload routes share a single fallback handler since axum
//! does not match `/{param}.suffix` patterns.

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, NARINFO_FILE, SCRATCH_DIR};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use ordinary_core::narinfo::{self, NarInfoFields};
use ordinary_core::{NarInfoId, NarPath, hash, validate_payload_url};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Chunk size for streaming payloads to clients (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// GET /nix-cache-info - Standard Nix cache metadata.
pub async fn get_nix_cache_info(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain")],
        state.config.server.cache_info(),
    )
}

/// Dispatch narinfo and payload requests by path shape and method.
pub async fn protocol_fallback(State(state): State<AppState>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    tracing::debug!(%method, %path, "protocol request");

    let result = dispatch(&state, &method, &path, req.into_body()).await;
    match result {
        Some(Ok(response)) => response,
        Some(Err(e)) => e.into_response(),
        None => {
            tracing::error!(%method, %path, "unhandled request");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    body: Body,
) -> Option<ApiResult<Response>> {
    if let Some(id) = NarInfoId::from_request_path(path) {
        match method {
            &Method::GET => return Some(get_narinfo(state, &id).await),
            &Method::PUT => return Some(put_narinfo(state, &id, body).await),
            _ => {}
        }
    }

    let url = path.strip_prefix('/').unwrap_or(path);
    if matches!(method, &Method::GET | &Method::HEAD)
        && let Some(id) = state.url_index.lookup(url).await
    {
        tracing::debug!(%id, url, "payload referenced by narinfo");
        return Some(get_nar(state, &id, url, *method == Method::HEAD).await);
    }

    if let Some(nar) = NarPath::from_request_path(path) {
        match method {
            &Method::PUT => return Some(put_nar(state, &nar, body).await),
            &Method::GET | &Method::HEAD => {
                return Some(Err(ApiError::NotFound(format!("payload not found: {nar}"))));
            }
            _ => {}
        }
    }

    None
}

/// GET /{id}.narinfo - restore the entry from the remote cache and serve
/// the narinfo exactly as it was uploaded.
async fn get_narinfo(state: &AppState, id: &NarInfoId) -> ApiResult<Response> {
    let entry = state.entry_dir(id);
    let key = state.cache_key(id);
    tracing::debug!(%id, "trying to restore narinfo");

    if state.cache.restore(&[entry.clone()], &key, &[]).await?.is_none() {
        tracing::info!(%id, "not found in cache");
        return Err(ApiError::NotFound(format!("narinfo not found: {id}")));
    }

    let bytes = match fs::read(entry.join(NARINFO_FILE)).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::info!(%id, error = %e, "not found in cache");
            return Err(ApiError::NotFound(format!("narinfo not found: {id}")));
        }
    };

    // Served byte-for-byte; the lossy view is only for the URL index.
    let url = narinfo::url_of(&String::from_utf8_lossy(&bytes)).map(str::to_string);
    if let Some(url) = &url {
        state.url_index.register(url, id).await;
    }
    tracing::info!(%id, url = url.as_deref().unwrap_or("-"), "found in cache");

    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "text/x-nix-narinfo")],
        bytes,
    )
        .into_response())
}

/// PUT /{id}.narinfo - bind an uploaded payload to its narinfo and save
/// both to the remote cache as one entry.
async fn put_narinfo(state: &AppState, id: &NarInfoId, body: Body) -> ApiResult<Response> {
    let bytes = axum::body::to_bytes(body, state.config.server.max_narinfo_size)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read narinfo body: {e}")))?;

    let fields = NarInfoFields::parse(&bytes);
    let Some(url) = fields.url() else {
        tracing::error!(%id, "narinfo has no URL");
        return Err(ApiError::BadRequest(format!("narinfo {id} has no URL")));
    };
    let relative = validate_payload_url(url)?;
    let scratch = state.work_dir().join(relative);

    check_file_hash(&scratch, url, fields.file_hash()).await?;

    let entry = state.entry_dir(id);
    if let Err(e) = store_entry(state, id, &bytes, &scratch, relative).await {
        remove_partial_entry(&entry).await;
        return Err(e);
    }

    state.url_index.register(url, id).await;
    tracing::info!(%id, url, "added cache entry");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Compare the scratch payload against the declared `FileHash`.
///
/// A mismatch is logged and accepted; a missing payload is an error.
async fn check_file_hash(scratch: &Path, url: &str, declared: Option<&str>) -> ApiResult<()> {
    let payload_error =
        |e: ordinary_core::Error| ApiError::Internal(format!("payload {url} unreadable: {e}"));
    match declared {
        Some(declared) => {
            let check = hash::verify_file(scratch, declared)
                .await
                .map_err(payload_error)?;
            if !check.is_match() {
                tracing::warn!(
                    url,
                    expected = %check.declared,
                    actual = %check.actual,
                    "payload hash mismatch"
                );
            }
        }
        None => {
            let actual = hash::digest_file(scratch).await.map_err(payload_error)?;
            tracing::warn!(url, actual = %actual.to_narinfo_string(), "narinfo has no FileHash");
        }
    }
    Ok(())
}

async fn store_entry(
    state: &AppState,
    id: &NarInfoId,
    narinfo: &[u8],
    scratch: &Path,
    relative: &Path,
) -> ApiResult<()> {
    let entry = state.entry_dir(id);
    fs::create_dir_all(&entry).await?;
    fs::write(entry.join(NARINFO_FILE), narinfo).await?;

    let dest = entry.join(relative);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    {
        let _guard = state.relocate_lock.lock().await;
        fs::rename(scratch, &dest).await?;
    }

    state.cache.save(&[entry], &state.cache_key(id)).await?;
    Ok(())
}

async fn remove_partial_entry(entry: &Path) {
    if let Err(e) = fs::remove_dir_all(entry).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(entry = %entry.display(), error = %e, "failed to remove partial entry");
    }
}

/// PUT /nar/{hash}.nar[.ext] - stream a payload into the scratch area.
async fn put_nar(state: &AppState, nar: &NarPath, body: Body) -> ApiResult<Response> {
    fs::create_dir_all(state.work_dir().join(SCRATCH_DIR)).await?;
    let dest = state.work_dir().join(nar.as_str());
    let temp = dest.with_file_name(format!(".{}.{}.tmp", nar.hash(), Uuid::new_v4()));

    if let Err(e) = write_stream(&temp, body).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e);
    }
    // Hash before the rename: once in place a narinfo PUT may move it.
    let digest = match hash::digest_file(&temp).await {
        Ok(digest) => digest,
        Err(e) => {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }
    };
    if let Err(e) = fs::rename(&temp, &dest).await {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }

    tracing::debug!(path = %nar, hash = %digest.to_narinfo_string(), "payload added to files");
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn write_stream(path: &Path, body: Body) -> ApiResult<()> {
    let mut file = fs::File::create(path).await?;
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| ApiError::BadRequest(format!("failed to read payload body: {e}")))?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// GET/HEAD of a payload referenced by a known narinfo.
///
/// The payload lives in the entry restored with its narinfo; if it has
/// gone missing locally the entry is restored again.
async fn get_nar(state: &AppState, id: &NarInfoId, url: &str, head: bool) -> ApiResult<Response> {
    let relative = validate_payload_url(url)?;
    let entry = state.entry_dir(id);
    let path = entry.join(relative);

    if !fs::try_exists(&path).await? {
        tracing::debug!(%id, url, "payload missing locally, restoring entry");
        state
            .cache
            .restore(&[entry], &state.cache_key(id), &[])
            .await?;
    }

    let file = match fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("payload not found: {url}")));
        }
        Err(e) => return Err(e.into()),
    };
    let size = file.metadata().await?.len();

    let body = if head {
        Body::empty()
    } else {
        Body::from_stream(tokio_util::io::ReaderStream::with_capacity(
            file,
            STREAM_CHUNK_SIZE,
        ))
    };

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/x-nix-nar".to_string()),
            (CONTENT_LENGTH, size.to_string()),
        ],
        body,
    )
        .into_response())
}
