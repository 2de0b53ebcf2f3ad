//! In-memory upstream used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use super::{ByteStream, Upstream, UpstreamResponse};
use crate::error::NetworkError;

/// Upstream serving canned responses and counting calls.
#[derive(Default)]
pub(crate) struct MockUpstream {
    responses: Mutex<HashMap<String, UpstreamResponse>>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl MockUpstream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_tile(self, url: &str, body: &'static [u8]) -> Self {
        self.set(url, UpstreamResponse::ok(body, Some("image/png")));
        self
    }

    pub(crate) fn set(&self, url: &str, response: UpstreamResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, url: &str) -> Result<UpstreamResponse, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
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
impl Upstream for MockUpstream {
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

        let body = response.body;
        let chunks: Vec<Result<Bytes, NetworkError>> = (0..body.len())
            .step_by(16 * 1024)
            .map(|start| Ok(body.slice(start..(start + 16 * 1024).min(body.len()))))
            .collect();

        Ok(ByteStream {
            content_length: Some(body.len() as u64),
            body: futures::stream::iter(chunks).boxed(),
        })
    }
}
