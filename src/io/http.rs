//! reqwest-backed upstream implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use super::upstream::{ByteStream, Upstream, UpstreamResponse};
use crate::error::NetworkError;

/// Default User-Agent sent to tile servers.
pub const DEFAULT_USER_AGENT: &str = concat!("tiledepot/", env!("CARGO_PKG_VERSION"));

/// Connect timeout. Slow but progressing transfers are never cut off.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Create an HTTP client suitable for tile and package downloads.
pub fn create_http_client(user_agent: &str) -> Result<Client, NetworkError> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| NetworkError::Connection(e.to_string()))
}

/// [`Upstream`] implementation over a shared reqwest client.
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, NetworkError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| NetworkError::InvalidUrl(format!("{url}: {e}")))?;

        self.client
            .get(parsed)
            .send()
            .await
            .map_err(|e| NetworkError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, url: &str) -> Result<UpstreamResponse, NetworkError> {
        let response = self.send(url).await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::Body(e.to_string()))?;

        debug!(url = url, status = status, bytes = body.len(), "Upstream fetch complete");

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }

    async fn open_stream(&self, url: &str) -> Result<ByteStream, NetworkError> {
        let response = self.send(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map_err(|e| NetworkError::Body(e.to_string()))
            .boxed();

        Ok(ByteStream {
            content_length,
            body,
        })
    }
}
