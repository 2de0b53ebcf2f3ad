//! Download-and-extract pipeline for packages.
//!
//! ```text
//! Upstream::open_stream ─► StreamReader ─► SyncIoBridge ─► CountingReader
//!      (async bytes)                        (blocking)       │ progress
//!                                                            ▼
//!                                  [GzDecoder] ─► Extractor (spawn_blocking)
//! ```
//!
//! Progress and completion are published as [`InstallEvent`]s on an
//! unbounded channel so a slow consumer never stalls the extraction thread.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::extract::{ExtractionSummary, Extractor};
use super::package::PackageDescriptor;
use super::progress::{CountingReader, ExtractionProgress};
use crate::error::{ArchiveError, ExtractionFailure};
use crate::io::Upstream;

/// Lifecycle notifications for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    /// Download accepted by the server
    Started {
        package: String,
        declared_size: Option<u64>,
    },

    Progress(ExtractionProgress),

    Completed {
        package: String,
        summary: ExtractionSummary,
    },

    Failed {
        package: String,
        extracted_files: u64,
        error: String,
    },
}

/// Installs packages under a fixed destination root.
pub struct PackageInstaller {
    upstream: Arc<dyn Upstream>,
    dest_root: PathBuf,
    cancel: CancellationToken,
}

impl PackageInstaller {
    pub fn new(upstream: Arc<dyn Upstream>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            upstream,
            dest_root: dest_root.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts installs started by this installer.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Download `package` and extract it.
    ///
    /// Always ends with a `Completed` or `Failed` event on `events`.
    pub async fn install(
        &self,
        package: &PackageDescriptor,
        events: mpsc::UnboundedSender<InstallEvent>,
    ) -> Result<ExtractionSummary, ExtractionFailure> {
        let result = self.download_and_extract(package, events.clone()).await;

        let event = match &result {
            Ok(summary) => InstallEvent::Completed {
                package: package.name.clone(),
                summary: *summary,
            },
            Err(failure) => {
                warn!(
                    package = %package.name,
                    extracted_files = failure.extracted_files,
                    error = %failure.error,
                    "Package install failed"
                );
                InstallEvent::Failed {
                    package: package.name.clone(),
                    extracted_files: failure.extracted_files,
                    error: failure.error.to_string(),
                }
            }
        };
        let _ = events.send(event);

        result
    }

    async fn download_and_extract(
        &self,
        package: &PackageDescriptor,
        events: mpsc::UnboundedSender<InstallEvent>,
    ) -> Result<ExtractionSummary, ExtractionFailure> {
        let fail = |error: ArchiveError| ExtractionFailure {
            package: package.name.clone(),
            extracted_files: 0,
            error,
        };

        info!(package = %package.name, url = %package.file_url, kind = %package.kind, "Downloading package");

        let stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(fail(ArchiveError::Cancelled)),
            opened = self.upstream.open_stream(&package.file_url) => {
                opened.map_err(|e| fail(ArchiveError::Network(e)))?
            }
        };

        let declared_size = package
            .declared_size()
            .or(stream.content_length.filter(|len| *len > 0));
        let _ = events.send(InstallEvent::Started {
            package: package.name.clone(),
            declared_size,
        });

        // Stream failures surface as ConnectionAborted so the extractor can
        // tell them apart from archive corruption
        let body = stream
            .body
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e))
            .take_until(self.cancel.clone().cancelled_owned())
            .boxed();
        let reader = SyncIoBridge::new(StreamReader::new(body));

        let extractor = Extractor::new(&self.dest_root).with_cancellation(self.cancel.clone());
        let cancel = self.cancel.clone();
        let name = package.name.clone();
        let kind = package.kind;

        let task = tokio::task::spawn_blocking(move || -> Result<ExtractionSummary, ExtractionFailure> {
            let mut counting = CountingReader::new(reader, name.clone(), declared_size, move |p| {
                let _ = events.send(InstallEvent::Progress(p));
            })
            .with_cancellation(cancel);

            let summary = extractor.extract_kind(&mut counting, kind, &name)?;

            // Consume trailing padding so the final progress tick is emitted
            if let Err(e) = io::copy(&mut counting, &mut io::sink()) {
                debug!(package = %name, error = %e, "Ignoring error after end of archive");
            }
            debug!(package = %name, bytes = counting.bytes_read(), "Archive stream consumed");
            Ok(summary)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => Err(fail(ArchiveError::Aborted(e.to_string()))),
        }
    }
}
