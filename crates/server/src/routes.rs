//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Liveness and shutdown stay reachable while the remote cache is down.
    // Other methods on fixed paths go to the protocol fallback, which
    // answers 404 and logs the unhandled request.
    let lifecycle_routes = Router::new()
        .route(
            "/readyz",
            get(handlers::readyz).fallback(handlers::protocol_fallback),
        )
        .route(
            "/quit",
            get(handlers::quit).fallback(handlers::protocol_fallback),
        );

    let protocol_routes = Router::new()
        .route(
            "/nix-cache-info",
            get(handlers::get_nix_cache_info).fallback(handlers::protocol_fallback),
        )
        .route(
            "/upload",
            post(handlers::post_upload).fallback(handlers::protocol_fallback),
        )
        // Narinfo and nar routes use a fallback handler since axum doesn't support /{param}.suffix
        .fallback(handlers::protocol_fallback)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_cache_available,
        ));

    Router::new()
        .merge(lifecycle_routes)
        .merge(protocol_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
