//! Test utilities for integration tests.
//!
//! This module provides an in-memory upstream with request tracking, router
//! setup helpers and tar fixture builders.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use http_body_util::BodyExt;
use tar::{Builder, EntryType, Header};
use tower::ServiceExt;

use tiledepot::admin::{AdminWorker, DEFAULT_ADMIN_QUEUE};
use tiledepot::error::NetworkError;
use tiledepot::io::{ByteStream, Upstream, UpstreamResponse};
use tiledepot::{create_router, AppState, RouterConfig, TileCache, TileService};

// =============================================================================
// Tracking Upstream
// =============================================================================

/// An in-memory upstream that tracks every request.
///
/// Unknown URLs answer `404`; while offline every call fails with a
/// connection error.
#[derive(Clone, Default)]
pub struct TrackingUpstream {
    responses: Arc<Mutex<HashMap<String, UpstreamResponse>>>,
    requests: Arc<Mutex<Vec<String>>>,
    request_count: Arc<AtomicUsize>,
    offline: Arc<AtomicBool>,
}

impl TrackingUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, url: &str, body: impl Into<Bytes>, content_type: &str) -> Self {
        self.set(url, UpstreamResponse::ok(body, Some(content_type)));
        self
    }

    pub fn set(&self, url: &str, response: UpstreamResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reset_tracking(&self) {
        self.request_count.store(0, Ordering::SeqCst);
        self.requests.lock().unwrap().clear();
    }

    fn lookup(&self, url: &str) -> Result<UpstreamResponse, NetworkError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(url.to_string());

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Connection("network unreachable".to_string()));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(UpstreamResponse {
                status: 404,
                content_type: None,
                body: Bytes::new(),
            }))
    }
}

#[async_trait]
impl Upstream for TrackingUpstream {
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, NetworkError> {
        self.lookup(url)
    }

    async fn open_stream(&self, url: &str) -> Result<ByteStream, NetworkError> {
        let response = self.lookup(url)?;
        if !response.is_success() {
            return Err(NetworkError::Status {
                status: response.status,
                url: url.to_string(),
            });
        }

        // Deliver in 8 KiB chunks like a real socket would
        let body = response.body;
        let chunks: Vec<Result<Bytes, NetworkError>> = (0..body.len())
            .step_by(8 * 1024)
            .map(|start| Ok(body.slice(start..(start + 8 * 1024).min(body.len()))))
            .collect();

        Ok(ByteStream {
            content_length: Some(body.len() as u64),
            body: futures::stream::iter(chunks).boxed(),
        })
    }
}

// =============================================================================
// App Setup
// =============================================================================

/// Build the full router over `cache` and `upstream`.
pub fn build_app(cache: Arc<TileCache>, upstream: TrackingUpstream, config: RouterConfig) -> Router {
    let upstream: Arc<dyn Upstream> = Arc::new(upstream);
    let tile_service = TileService::new(cache.clone(), upstream.clone());
    let (admin, _task) = AdminWorker::new(cache, upstream).spawn(DEFAULT_ADMIN_QUEUE);

    create_router(
        AppState::new(Arc::new(tile_service), admin),
        config.with_tracing(false),
    )
}

/// `GET /fetch?url=...` with the URL percent-encoded.
pub fn fetch_request(url: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/fetch?url={}", urlencoding::encode(url)))
        .body(Body::empty())
        .unwrap()
}

/// `POST /admin` with a JSON body and optional bearer token.
pub fn admin_request(body: serde_json::Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/admin")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Send one request through a clone of the router.
pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// =============================================================================
// Archive Fixtures
// =============================================================================

/// A tar entry fixture: a trailing `/` makes a directory.
pub fn create_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = Header::new_gnu();
        if path.ends_with('/') {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder.append_data(&mut header, path, std::io::empty()).unwrap();
        } else {
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(data.len() as u64);
            builder.append_data(&mut header, path, *data).unwrap();
        }
    }
    builder.into_inner().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
