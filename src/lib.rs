//! # tiledepot
//!
//! An offline-first map tile cache with a bounded store, and a streaming
//! installer for tar/gzip map packages.
//!
//! ## Features
//!
//! - **Cache-first tile fetching**: tile URLs are served from the cache while
//!   fresh, refreshed when stale, and served stale when the network is down
//! - **Bounded storage**: a running byte total drives oldest-quartile eviction
//! - **Persistent store**: in-memory or disk-backed entries with sidecar metadata
//! - **Admin channel**: cache status, clear and bulk download requests with
//!   correlated replies, in-process or over `POST /admin`
//! - **Package installer**: downloads a manifest-listed package and extracts
//!   it while streaming, with throttled progress events and cancellation
//!
//! ## Architecture
//!
//! - [`tile`] - URL classification, the tile cache and the fetch policy
//! - [`store`] - Entry persistence (memory, disk)
//! - [`admin`] - Admin protocol and worker
//! - [`archive`] - Manifest, progress reader, tar extraction and installer
//! - [`io`] - Upstream network access
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tiledepot::{create_http_client, HttpUpstream, TileCache, TileService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let upstream = Arc::new(HttpUpstream::new(create_http_client("tiledepot")?));
//!     let cache = Arc::new(TileCache::in_memory(500_000_000));
//!     let service = TileService::new(cache, upstream);
//!
//!     let tile = service.fetch("https://tile.example.com/7/34/22.png").await?;
//!     println!("{} bytes ({})", tile.data.len(), tile.cache_status.as_str());
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod archive;
pub mod config;
pub mod error;
pub mod io;
pub mod server;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use admin::{AdminHandle, AdminMessage, AdminReply, AdminRequest, AdminWorker};
pub use archive::{
    installed_usage, ArchiveKind, CountingReader, ExtractionProgress, ExtractionSummary, Extractor,
    InstallEvent, InstalledUsage, PackageDescriptor, PackageInstaller, PackageManifest,
};
pub use config::{
    parse_size, ClearConfig, Cli, Command, InstallConfig, PackagesConfig, ServeConfig,
};
pub use error::{
    ArchiveError, ExtractionFailure, ManifestError, NetworkError, StorageError, TileError,
};
pub use io::{create_http_client, ByteStream, HttpUpstream, Upstream, UpstreamResponse};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use store::{CacheEntry, DiskStore, EntryMeta, EntryStore, MemoryStore};
pub use tile::{
    is_tile_request, usage_percent, CacheKey, CacheStats, CacheStatus, TileCache, TileResponse,
    TileService,
};
