//! API integration tests for tile fetching and error handling.
//!
//! Tests verify:
//! - The miss -> fresh sequence and its response headers
//! - Stale refresh and stale fallback
//! - Offline behaviour for tiles and non-tile requests
//! - Persistence of the disk store across restarts

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use tiledepot::io::UpstreamResponse;
use tiledepot::store::{CacheEntry, DiskStore};
use tiledepot::{CacheKey, RouterConfig, TileCache};

use super::test_utils::{body_bytes, body_json, build_app, fetch_request, send, TrackingUpstream};

const TILE_URL: &str = "https://tile.example.com/7/34/22.png";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-tile";

fn cached_date(response: &axum::http::Response<Body>) -> DateTime<Utc> {
    let value = response.headers().get("cached-date").unwrap().to_str().unwrap();
    DateTime::parse_from_rfc3339(value).unwrap().with_timezone(&Utc)
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache, TrackingUpstream::new(), RouterConfig::new());

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

// =============================================================================
// Tile Fetch Policy
// =============================================================================

#[tokio::test]
async fn test_empty_cache_miss_stores_tile() {
    let upstream = TrackingUpstream::new().with_response(TILE_URL, PNG, "image/png");
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache.clone(), upstream.clone(), RouterConfig::new());

    let before = Utc::now();
    let response = send(&router, fetch_request(TILE_URL)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-cache").unwrap(), "miss");
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    let stamped = cached_date(&response);
    assert!(stamped <= Utc::now());
    // RFC 3339 keeps sub-second precision
    assert!(stamped >= before);
    assert_eq!(body_bytes(response).await, Bytes::from_static(PNG));

    assert_eq!(upstream.request_count(), 1);
    assert_eq!(cache.len().await, 1);
    let entry = cache
        .get(&CacheKey::from_url(TILE_URL))
        .await
        .unwrap()
        .unwrap();
    assert!(entry.cached_date() <= Utc::now());
    assert_eq!(entry.payload, Bytes::from_static(PNG));
}

#[tokio::test]
async fn test_second_request_is_fresh_without_network() {
    let upstream = TrackingUpstream::new().with_response(TILE_URL, PNG, "image/png");
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache, upstream.clone(), RouterConfig::new());

    let first = send(&router, fetch_request(TILE_URL)).await;
    assert_eq!(first.headers().get("x-tile-cache").unwrap(), "miss");

    upstream.reset_tracking();
    let second = send(&router, fetch_request(TILE_URL)).await;

    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers().get("x-tile-cache").unwrap(), "fresh");
    assert_eq!(body_bytes(second).await, Bytes::from_static(PNG));
    assert_eq!(upstream.request_count(), 0);
}

#[tokio::test]
async fn test_fragment_does_not_split_cache_entries() {
    let upstream = TrackingUpstream::new().with_response(TILE_URL, PNG, "image/png");
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache.clone(), upstream.clone(), RouterConfig::new());

    send(&router, fetch_request(TILE_URL)).await;
    let response = send(&router, fetch_request(&format!("{TILE_URL}#retina"))).await;

    assert_eq!(response.headers().get("x-tile-cache").unwrap(), "fresh");
    assert_eq!(upstream.request_count(), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_stale_tile_is_refreshed() {
    let upstream = TrackingUpstream::new().with_response(TILE_URL, b"new".to_vec(), "image/png");
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let old = Utc::now() - Duration::days(45);
    cache
        .put(CacheEntry::with_date(
            CacheKey::from_url(TILE_URL),
            Bytes::from_static(b"old"),
            Some("image/png".to_string()),
            old,
        ))
        .await
        .unwrap();
    let router = build_app(cache.clone(), upstream.clone(), RouterConfig::new());

    let response = send(&router, fetch_request(TILE_URL)).await;

    assert_eq!(response.headers().get("x-tile-cache").unwrap(), "refreshed");
    assert!(cached_date(&response) > old);
    assert_eq!(body_bytes(response).await, Bytes::from_static(b"new"));
    assert_eq!(upstream.request_count(), 1);
    assert_eq!(cache.total_size().await, 3);
}

#[tokio::test]
async fn test_stale_tile_served_when_offline() {
    let upstream = TrackingUpstream::new();
    upstream.set_offline(true);
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let old = Utc::now() - Duration::days(90);
    cache
        .put(CacheEntry::with_date(
            CacheKey::from_url(TILE_URL),
            Bytes::from_static(PNG),
            Some("image/png".to_string()),
            old,
        ))
        .await
        .unwrap();
    let router = build_app(cache, upstream.clone(), RouterConfig::new());

    let response = send(&router, fetch_request(TILE_URL)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-cache").unwrap(), "stale");
    assert_eq!(cached_date(&response), old);
    assert_eq!(body_bytes(response).await, Bytes::from_static(PNG));
    assert_eq!(upstream.request_count(), 1);
}

#[tokio::test]
async fn test_uncached_tile_offline_is_not_available() {
    let upstream = TrackingUpstream::new();
    upstream.set_offline(true);
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache.clone(), upstream, RouterConfig::new());

    let response = send(&router, fetch_request(TILE_URL)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "not_available_offline");
    assert_eq!(json["status"], 404);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_upstream_error_status_passes_through_uncached() {
    let upstream = TrackingUpstream::new();
    upstream.set(
        TILE_URL,
        UpstreamResponse {
            status: 503,
            content_type: Some("text/plain".to_string()),
            body: Bytes::from_static(b"busy"),
        },
    );
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache.clone(), upstream, RouterConfig::new());

    let response = send(&router, fetch_request(TILE_URL)).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().get("cached-date").is_none());
    assert!(cache.is_empty().await);
}

// =============================================================================
// Non-tile Requests
// =============================================================================

#[tokio::test]
async fn test_non_tile_request_bypasses_cache() {
    let url = "https://api.example.com/search?q=harbour";
    let upstream = TrackingUpstream::new().with_response(url, b"{}".to_vec(), "application/json");
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache.clone(), upstream.clone(), RouterConfig::new());

    for _ in 0..2 {
        let response = send(&router, fetch_request(url)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-tile-cache").unwrap(), "bypass");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    assert_eq!(upstream.request_count(), 2);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_non_tile_request_offline_is_bad_gateway() {
    let upstream = TrackingUpstream::new();
    upstream.set_offline(true);
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache, upstream, RouterConfig::new());

    let response = send(&router, fetch_request("https://api.example.com/style.json")).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], "upstream_error");
}

#[tokio::test]
async fn test_missing_url_parameter_is_rejected() {
    let cache = Arc::new(TileCache::in_memory(1_000_000));
    let router = build_app(cache, TrackingUpstream::new(), RouterConfig::new());

    let request = Request::builder()
        .uri("/fetch")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&router, fetch_request("  ")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

// =============================================================================
// Disk Persistence
// =============================================================================

#[tokio::test]
async fn test_disk_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = TrackingUpstream::new().with_response(TILE_URL, PNG, "image/png");

    {
        let store = DiskStore::open(dir.path()).await.unwrap();
        let cache = Arc::new(TileCache::open(Arc::new(store), 1_000_000).await.unwrap());
        let router = build_app(cache, upstream.clone(), RouterConfig::new());
        let response = send(&router, fetch_request(TILE_URL)).await;
        assert_eq!(response.headers().get("x-tile-cache").unwrap(), "miss");
    }

    upstream.reset_tracking();
    upstream.set_offline(true);

    let store = DiskStore::open(dir.path()).await.unwrap();
    let cache = Arc::new(TileCache::open(Arc::new(store), 1_000_000).await.unwrap());
    assert_eq!(cache.len().await, 1);
    assert_eq!(cache.total_size().await, PNG.len() as u64);

    let router = build_app(cache, upstream.clone(), RouterConfig::new());
    let response = send(&router, fetch_request(TILE_URL)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-cache").unwrap(), "fresh");
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(body_bytes(response).await, Bytes::from_static(PNG));
    assert_eq!(upstream.request_count(), 0);
}
