use std::path::PathBuf;

use thiserror::Error;

/// Errors from reaching an upstream server
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// Connection could not be established or was dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    /// Response body could not be read to the end
    #[error("Body read error: {0}")]
    Body(String),

    /// URL could not be used for a request
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors from the local cache medium
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Reading, writing or deleting a file failed
    #[error("Storage I/O error at {path}: {message}")]
    Io { path: PathBuf, message: String },

    /// A metadata sidecar could not be parsed
    #[error("Corrupt cache metadata at {path}: {message}")]
    CorruptMetadata { path: PathBuf, message: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Errors while reading or unpacking a tar stream
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Malformed header or premature end of stream
    #[error("Malformed archive: {0}")]
    Decode(String),

    /// The byte source failed mid-stream
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Writing an extracted entry failed
    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    /// Entry path is absolute or escapes the destination root
    #[error("Unsafe entry path rejected: {0}")]
    UnsafePath(String),

    /// The operation was cancelled by the caller
    #[error("Extraction cancelled")]
    Cancelled,

    /// The blocking extraction task panicked or was aborted
    #[error("Extraction task aborted: {0}")]
    Aborted(String),
}

/// An aborted extraction, with the number of files already written.
#[derive(Debug, Error)]
#[error("Extraction of {package} failed after {extracted_files} file(s): {error}")]
pub struct ExtractionFailure {
    pub package: String,
    pub extracted_files: u64,
    #[source]
    pub error: ArchiveError,
}

/// Errors when reading a package manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest: {0}")]
    Read(String),

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate package name in manifest: {0}")]
    DuplicateName(String),

    #[error("Package not found in manifest: {0}")]
    UnknownPackage(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

/// Errors surfaced by the tile fetch path
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// No cached copy and the network could not provide one
    #[error("Tile not available offline: {url}")]
    NotAvailableOffline { url: String },

    /// The request did not carry a usable URL
    #[error("Invalid tile URL: {0}")]
    InvalidUrl(String),

    /// A non-tile request could not be forwarded
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] NetworkError),
}
