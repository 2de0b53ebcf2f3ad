use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::NetworkError;

/// A fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// HTTP status code returned by the upstream server
    pub status: u16,

    /// Value of the `Content-Type` header, if any
    pub content_type: Option<String>,

    /// Response body
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Create a `200 OK` response.
    pub fn ok(body: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            status: 200,
            content_type: content_type.map(str::to_string),
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A streamed upstream body.
pub struct ByteStream {
    /// Length advertised by the server, if any
    pub content_length: Option<u64>,

    /// Body chunks in arrival order
    pub body: BoxStream<'static, Result<Bytes, NetworkError>>,
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Trait for reaching remote tile servers and package hosts.
///
/// The tile fetch policy, the admin channel and the package installer all go
/// through this seam so they can be exercised against in-memory upstreams.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch a URL and buffer the whole body.
    ///
    /// Non-success statuses are returned as `Ok` so callers can decide how to
    /// treat them; only connection-level failures are errors.
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, NetworkError>;

    /// Open a URL as a byte stream.
    ///
    /// Non-success statuses are reported as [`NetworkError::Status`].
    async fn open_stream(&self, url: &str) -> Result<ByteStream, NetworkError>;
}
