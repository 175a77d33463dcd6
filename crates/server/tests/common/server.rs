//! Server test utilities.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use ordinary_cache::{MemoryCache, RemoteCache};
use ordinary_core::config::AppConfig;
use ordinary_server::{AppState, create_router};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub cache: Arc<MemoryCache>,
    _temp_dir: Arc<TempDir>,
}

/// Status, headers and body of a response.
#[allow(dead_code)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with a temporary work dir and memory cache.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = AppConfig::for_testing(temp_dir.path().join("work"));
        modifier(&mut config);

        let cache = Arc::new(MemoryCache::new());
        Self::build(config, cache, Arc::new(temp_dir)).await
    }

    /// Create a test server around an arbitrary remote cache.
    pub async fn with_cache(cache: Arc<dyn RemoteCache>) -> (axum::Router, AppState, TempDir) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let state = AppState::new(AppConfig::for_testing(temp_dir.path().join("work")), cache);
        state
            .prepare_work_dir()
            .await
            .expect("Failed to prepare work dir");
        (create_router(state.clone()), state, temp_dir)
    }

    async fn build(config: AppConfig, cache: Arc<MemoryCache>, temp_dir: Arc<TempDir>) -> Self {
        let state = AppState::new(config, cache.clone());
        state
            .prepare_work_dir()
            .await
            .expect("Failed to prepare work dir");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            cache,
            _temp_dir: temp_dir,
        }
    }

    /// A fresh server process over the same config and remote cache,
    /// with the local work dir wiped.
    pub async fn restart(&self) -> Self {
        let work_dir = self.state.work_dir().to_path_buf();
        std::fs::remove_dir_all(&work_dir).expect("Failed to wipe work dir");
        let config = (*self.state.config).clone();
        Self::build(config, self.cache.clone(), self._temp_dir.clone()).await
    }

    pub async fn request(&self, method: Method, uri: &str, body: impl Into<Body>) -> TestResponse {
        send(&self.router, method, uri, body).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, Body::empty()).await
    }

    pub async fn put(&self, uri: &str, body: impl Into<Body>) -> TestResponse {
        self.request(Method::PUT, uri, body).await
    }
}

/// Send one request through `router`.
#[allow(dead_code)]
pub async fn send(
    router: &axum::Router,
    method: Method,
    uri: &str,
    body: impl Into<Body>,
) -> TestResponse {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Whether httpmock and spawned servers can listen on loopback.
#[allow(dead_code)]
pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}
