//! Admin channel integration tests over `POST /admin`.
//!
//! Tests verify:
//! - CACHE_STATUS, CLEAR_CACHE and BULK_DOWNLOAD replies and id correlation
//! - Failure replies for unknown types and failed downloads
//! - Bearer token enforcement when a token is configured

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use serde_json::json;

use tiledepot::store::CacheEntry;
use tiledepot::{CacheKey, RouterConfig, TileCache};

use super::test_utils::{admin_request, body_json, build_app, fetch_request, send, TrackingUpstream};

async fn seeded_cache(max_bytes: u64, sizes: &[usize]) -> Arc<TileCache> {
    let cache = Arc::new(TileCache::in_memory(max_bytes));
    for (n, size) in sizes.iter().enumerate() {
        cache
            .put(CacheEntry::new(
                CacheKey::from_url(&format!("https://tile.example.com/3/{n}/1.png")),
                Bytes::from(vec![7u8; *size]),
                Some("image/png".to_string()),
            ))
            .await
            .unwrap();
    }
    cache
}

// =============================================================================
// Requests
// =============================================================================

#[tokio::test]
async fn test_cache_status_reply() {
    let cache = seeded_cache(2000, &[300, 200]).await;
    let router = build_app(cache, TrackingUpstream::new(), RouterConfig::new());

    let response = send(
        &router,
        admin_request(json!({"id": "req-1", "type": "CACHE_STATUS"}), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let reply = body_json(response).await;
    assert_eq!(reply["id"], "req-1");
    assert_eq!(reply["success"], true);
    assert_eq!(reply["status"]["entry_count"], 2);
    assert_eq!(reply["status"]["total_bytes"], 500);
    assert_eq!(reply["status"]["max_bytes"], 2000);
    assert_eq!(reply["status"]["usage_percent"], 25);
}

#[tokio::test]
async fn test_clear_cache_then_offline_tiles_unavailable() {
    let cache = seeded_cache(10_000, &[10, 20, 30]).await;
    let upstream = TrackingUpstream::new();
    upstream.set_offline(true);
    let router = build_app(cache.clone(), upstream, RouterConfig::new());

    let reply = body_json(
        send(
            &router,
            admin_request(json!({"id": 7, "type": "CLEAR_CACHE"}), None),
        )
        .await,
    )
    .await;

    assert_eq!(reply["id"], 7);
    assert_eq!(reply["success"], true);
    assert_eq!(reply["result"]["removed"], 3);
    assert!(cache.is_empty().await);
    assert_eq!(cache.total_size().await, 0);

    let response = send(&router, fetch_request("https://tile.example.com/3/0/1.png")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_download_reports_size() {
    let url = "https://maps.example.com/region.tar";
    let upstream =
        TrackingUpstream::new().with_response(url, vec![0u8; 4096], "application/x-tar");
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache.clone(), upstream.clone(), RouterConfig::new());

    let reply = body_json(
        send(
            &router,
            admin_request(
                json!({"type": "BULK_DOWNLOAD", "data": {"url": url, "options": {"zoom": [1, 8]}}}),
                None,
            ),
        )
        .await,
    )
    .await;

    assert_eq!(reply["success"], true);
    assert_eq!(reply["result"]["size"], 4096);
    assert!(reply.get("id").is_none());
    assert_eq!(upstream.requests(), vec![url.to_string()]);
    // Only the size is reported; nothing lands in the tile cache
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_bulk_download_failure_reply() {
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache, TrackingUpstream::new(), RouterConfig::new());

    let reply = body_json(
        send(
            &router,
            admin_request(
                json!({"id": 3, "type": "BULK_DOWNLOAD", "data": {"url": "https://maps.example.com/missing.tar"}}),
                None,
            ),
        )
        .await,
    )
    .await;

    assert_eq!(reply["id"], 3);
    assert_eq!(reply["success"], false);
    assert_eq!(reply["error"], "Failed to download: HTTP 404");
}

#[tokio::test]
async fn test_unknown_type_is_failure_reply() {
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache, TrackingUpstream::new(), RouterConfig::new());

    let response = send(
        &router,
        admin_request(json!({"id": 1, "type": "REBOOT"}), None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let reply = body_json(response).await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["error"], "Unknown message type: REBOOT");
}

#[tokio::test]
async fn test_malformed_message_is_failure_reply() {
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache, TrackingUpstream::new(), RouterConfig::new());

    let response = send(&router, admin_request(json!({"id": 5, "data": {}}), None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let reply = body_json(response).await;
    assert_eq!(reply["success"], false);
    assert!(reply["error"].as_str().unwrap().contains("type"));
}

#[tokio::test]
async fn test_non_json_body_is_failure_reply() {
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache, TrackingUpstream::new(), RouterConfig::new());

    let request = Request::builder()
        .method("POST")
        .uri("/admin")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let reply = body_json(response).await;
    assert_eq!(reply["success"], false);
    assert!(reply["error"].is_string());
}

// =============================================================================
// Admin Token
// =============================================================================

#[tokio::test]
async fn test_admin_token_required_when_configured() {
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(
        cache,
        TrackingUpstream::new(),
        RouterConfig::new().with_admin_token("s3cret"),
    );
    let status = json!({"type": "CACHE_STATUS"});

    let response = send(&router, admin_request(status.clone(), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "missing_token");

    let response = send(&router, admin_request(status.clone(), Some("wrong"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_token");

    let response = send(&router, admin_request(status, Some("s3cret"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
}

#[tokio::test]
async fn test_admin_token_does_not_guard_fetch() {
    let url = "https://tile.example.com/1/0/0.png";
    let upstream = TrackingUpstream::new().with_response(url, b"t".to_vec(), "image/png");
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache, upstream, RouterConfig::new().with_admin_token("s3cret"));

    let response = send(&router, fetch_request(url)).await;
    assert_eq!(response.status(), StatusCode::OK);
}
