//! Readiness, shutdown and availability gating.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// GET /readyz - 200 once the listener is bound.
pub async fn readyz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// GET /quit - acknowledge, then stop accepting connections.
///
/// In-flight requests are allowed to finish.
pub async fn quit(State(state): State<AppState>) -> impl IntoResponse {
    tracing::info!("shutdown requested");
    state.shutdown.cancel();
    (StatusCode::OK, "Goodbye")
}

/// Reject protocol requests while the remote cache cannot be used.
pub async fn require_cache_available(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    if !state.cache.available() {
        return ApiError::StoreUnavailable(format!(
            "{} backend is not available",
            state.cache.backend_name()
        ))
        .into_response();
    }
    next.run(req).await
}
