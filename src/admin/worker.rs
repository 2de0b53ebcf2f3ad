use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::protocol::{AdminMessage, AdminReply, AdminRequest, BulkDownload};
use crate::io::Upstream;
use crate::tile::TileCache;

/// Default capacity of the admin request queue.
pub const DEFAULT_ADMIN_QUEUE: usize = 32;

// =============================================================================
// Envelope / Handle
// =============================================================================

/// A request in flight to the worker, with its reply channel.
pub struct AdminEnvelope {
    /// Correlation id copied into the reply
    pub id: Option<Value>,

    pub request: AdminRequest,

    pub reply_tx: oneshot::Sender<AdminReply>,
}

impl AdminEnvelope {
    pub fn new(id: Option<Value>, request: AdminRequest) -> (Self, oneshot::Receiver<AdminReply>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        (
            Self {
                id,
                request,
                reply_tx,
            },
            reply_rx,
        )
    }
}

/// Cloneable sender side of the admin channel.
#[derive(Clone)]
pub struct AdminHandle {
    tx: mpsc::Sender<AdminEnvelope>,
}

impl AdminHandle {
    /// Send a decoded request and wait for its reply.
    pub async fn request(&self, id: Option<Value>, request: AdminRequest) -> AdminReply {
        let (envelope, reply_rx) = AdminEnvelope::new(id.clone(), request);

        if self.tx.send(envelope).await.is_err() {
            return AdminReply::failure(id, "Admin worker is not running");
        }

        reply_rx
            .await
            .unwrap_or_else(|_| AdminReply::failure(id, "Admin worker dropped the request"))
    }

    /// Decode a raw message, then send it. Undecodable messages are answered
    /// with a failure reply without reaching the worker.
    pub async fn send(&self, message: AdminMessage) -> AdminReply {
        match AdminRequest::from_message(&message) {
            Ok(request) => self.request(message.id, request).await,
            Err(error) => AdminReply::failure(message.id, error),
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

/// Serves admin requests against the shared cache.
#[derive(Clone)]
pub struct AdminWorker {
    cache: Arc<TileCache>,
    upstream: Arc<dyn Upstream>,
}

impl AdminWorker {
    pub fn new(cache: Arc<TileCache>, upstream: Arc<dyn Upstream>) -> Self {
        Self { cache, upstream }
    }

    /// Start the worker loop and return a handle to it.
    ///
    /// The loop ends once every handle has been dropped.
    pub fn spawn(self, queue: usize) -> (AdminHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let task = tokio::spawn(self.run(rx));
        (AdminHandle { tx }, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<AdminEnvelope>) {
        debug!("Admin worker started");

        while let Some(envelope) = rx.recv().await {
            let worker = self.clone();
            tokio::spawn(async move {
                let reply = worker.handle(envelope.id, envelope.request).await;
                if envelope.reply_tx.send(reply).is_err() {
                    debug!("Admin caller went away before the reply");
                }
            });
        }

        debug!("Admin worker stopped");
    }

    /// Serve one request.
    pub async fn handle(&self, id: Option<Value>, request: AdminRequest) -> AdminReply {
        debug!(kind = request.kind(), "Admin request");

        match request {
            AdminRequest::CacheStatus => AdminReply::status(id, self.cache.stats().await),
            AdminRequest::ClearCache => match self.cache.delete_all().await {
                Ok(removed) => AdminReply::result(id, json!({ "removed": removed })),
                Err(e) => AdminReply::failure(id, e.to_string()),
            },
            AdminRequest::BulkDownload(bulk) => match self.bulk_download(&bulk).await {
                Ok(result) => AdminReply::result(id, result),
                Err(error) => {
                    warn!(url = %bulk.url, error = %error, "Bulk download failed");
                    AdminReply::failure(id, error)
                }
            },
        }
    }

    async fn bulk_download(&self, bulk: &BulkDownload) -> Result<Value, String> {
        info!(url = %bulk.url, "Starting bulk download");

        let response = self
            .upstream
            .fetch(&bulk.url)
            .await
            .map_err(|e| e.to_string())?;
        if !response.is_success() {
            return Err(format!("Failed to download: HTTP {}", response.status));
        }

        let size = response.body.len();
        info!(url = %bulk.url, size = size, "Bulk download complete");

        Ok(json!({
            "message": "Bulk download complete",
            "size": size,
        }))
    }
}
