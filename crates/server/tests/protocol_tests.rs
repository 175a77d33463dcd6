//! Integration tests for the binary cache protocol endpoints.

mod common;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, StatusCode};
use common::{TestEntry, TestServer};
use ordinary_server::state::{NARINFO_FILE, SCRATCH_DIR};

/// Upload payload and narinfo the way `nix copy` does.
async fn store(server: &TestServer, entry: &TestEntry) {
    let response = server.put(&entry.nar_path(), entry.nar.clone()).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    let response = server.put(&entry.narinfo_path(), entry.narinfo()).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT, "{}", response.text());
}

#[tokio::test]
async fn test_nix_cache_info() {
    let server = TestServer::new().await;

    let response = server.get("/nix-cache-info").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[CONTENT_TYPE], "text/plain");
    assert_eq!(
        response.text(),
        "StoreDir: /nix/store\nWantMassQuery: 1\nPriority: 10"
    );
}

#[tokio::test]
async fn test_nix_cache_info_uses_config() {
    let server = TestServer::with_config(|config| {
        config.server.priority = 40;
        config.server.want_mass_query = false;
    })
    .await;

    let response = server.get("/nix-cache-info").await;
    assert_eq!(
        response.text(),
        "StoreDir: /nix/store\nWantMassQuery: 0\nPriority: 40"
    );
}

#[tokio::test]
async fn test_put_nar_lands_in_scratch() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(1, 4096);

    let response = server.put(&entry.nar_path(), entry.nar.clone()).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let scratch = server.state.work_dir().join(&entry.url);
    assert_eq!(std::fs::read(&scratch).unwrap(), entry.nar);

    // No temp files left behind.
    let leftovers: Vec<_> = std::fs::read_dir(server.state.work_dir().join(SCRATCH_DIR))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_store_and_fetch_round_trip() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(2, 200_000);
    store(&server, &entry).await;

    // Payload moved from scratch into the entry directory.
    let entry_dir = server.state.work_dir().join(&entry.id);
    assert!(!server.state.work_dir().join(&entry.url).exists());
    assert_eq!(std::fs::read(entry_dir.join(&entry.url)).unwrap(), entry.nar);
    assert_eq!(
        std::fs::read_to_string(entry_dir.join(NARINFO_FILE)).unwrap(),
        entry.narinfo()
    );
    assert!(server.cache.contains(&format!("nix0:{}", entry.id)).await);

    let response = server.get(&entry.narinfo_path()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[CONTENT_TYPE], "text/x-nix-narinfo");
    assert_eq!(response.text(), entry.narinfo());

    let response = server.get(&entry.nar_path()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[CONTENT_TYPE], "application/x-nix-nar");
    assert_eq!(
        response.headers[CONTENT_LENGTH],
        entry.nar.len().to_string().as_str()
    );
    assert_eq!(response.body, entry.nar);
}

#[tokio::test]
async fn test_head_nar_has_length_and_no_body() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(3, 1000);
    store(&server, &entry).await;

    let response = server
        .request(Method::HEAD, &entry.nar_path(), Body::empty())
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[CONTENT_LENGTH], "1000");
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_entry_survives_losing_work_dir() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(4, 2048);
    store(&server, &entry).await;

    let restarted = server.restart().await;
    assert!(!restarted.state.work_dir().join(&entry.id).exists());

    // The payload URL is unknown until its narinfo has been looked up.
    let response = restarted.get(&entry.nar_path()).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = restarted.get(&entry.narinfo_path()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), entry.narinfo());

    let response = restarted.get(&entry.nar_path()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, entry.nar);
}

#[tokio::test]
async fn test_missing_local_payload_is_restored_again() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(5, 512);
    store(&server, &entry).await;

    let local = server.state.work_dir().join(&entry.id).join(&entry.url);
    std::fs::remove_file(&local).unwrap();

    let response = server.get(&entry.nar_path()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, entry.nar);
    assert!(local.exists());
}

#[tokio::test]
async fn test_unknown_narinfo_is_not_found() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(6, 16);

    let response = server.get(&entry.narinfo_path()).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(server.state.url_index.is_empty().await);
}

#[tokio::test]
async fn test_narinfo_without_url_is_rejected() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(7, 16);

    let response = server
        .put(
            &entry.narinfo_path(),
            format!("StorePath: /nix/store/{}-x\nNarSize: 16\n", entry.id),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(!server.state.work_dir().join(&entry.id).exists());
    assert!(server.cache.is_empty().await);
}

#[tokio::test]
async fn test_narinfo_with_unsafe_url_is_rejected() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(8, 16);

    let response = server
        .put(&entry.narinfo_path(), "URL: ../../etc/passwd\n")
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(server.cache.is_empty().await);

    let response = server.put(&entry.narinfo_path(), "URL: /etc/passwd\n").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_narinfo_before_payload_fails_cleanly() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(9, 16);

    let response = server.put(&entry.narinfo_path(), entry.narinfo()).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!server.state.work_dir().join(&entry.id).exists());
    assert!(server.cache.is_empty().await);

    // Retrying once the payload is present succeeds.
    store(&server, &entry).await;
    assert_eq!(server.cache.len().await, 1);
}

#[tokio::test]
async fn test_hash_mismatch_is_accepted() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(10, 64);
    let wrong = TestEntry::new(11, 64).file_hash;

    let response = server.put(&entry.nar_path(), entry.nar.clone()).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    let response = server
        .put(&entry.narinfo_path(), entry.narinfo_with_hash(&wrong))
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = server.get(&entry.narinfo_path()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text().contains(&wrong));
}

#[tokio::test]
async fn test_oversized_narinfo_is_rejected() {
    let server = TestServer::with_config(|config| config.server.max_narinfo_size = 32).await;
    let entry = TestEntry::new(12, 16);

    let response = server.put(&entry.narinfo_path(), entry.narinfo()).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unregistered_nar_is_not_found() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(13, 16);

    // Present in scratch but not bound to any narinfo.
    let response = server.put(&entry.nar_path(), entry.nar.clone()).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let response = server.get(&entry.nar_path()).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unhandled_requests_are_not_found() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(14, 16);

    for (method, uri) in [
        (Method::GET, "/favicon.ico"),
        (Method::GET, "/short.narinfo"),
        (Method::PUT, "/nar/short.nar"),
        (Method::DELETE, entry.narinfo_path().as_str()),
        (Method::POST, entry.nar_path().as_str()),
        (Method::GET, "/upload"),
        (Method::PUT, "/nix-cache-info"),
        (Method::POST, "/readyz"),
        (Method::POST, "/quit"),
    ] {
        let response = server.request(method.clone(), uri, Body::empty()).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{method} {uri}");
    }
}

#[tokio::test]
async fn test_second_store_for_same_id_keeps_serving() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(15, 128);
    store(&server, &entry).await;
    store(&server, &entry).await;

    let response = server.get(&entry.nar_path()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, entry.nar);
}

#[tokio::test]
async fn test_narinfo_bytes_served_verbatim() {
    let server = TestServer::new().await;
    let entry = TestEntry::new(16, 256);
    let response = server.put(&entry.nar_path(), entry.nar.clone()).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    let mut narinfo = entry.narinfo().into_bytes();
    narinfo.extend_from_slice(b"Comment: caf\xe9\n");
    let response = server.put(&entry.narinfo_path(), narinfo.clone()).await;
    assert_eq!(response.status, StatusCode::NO_CONTENT, "{}", response.text());

    let response = server.get(&entry.narinfo_path()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, narinfo);

    let response = server.get(&entry.nar_path()).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, entry.nar);
}
