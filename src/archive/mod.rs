//! Bulk package ingestion.
//!
//! Streams a remote tar bundle (optionally gzip-compressed), reports
//! byte-level progress while reading it, and writes each entry to disk as it
//! arrives.
//!
//! # Components
//!
//! - [`PackageManifest`] / [`PackageDescriptor`]: what can be installed
//! - [`CountingReader`]: byte counting with throttled progress callbacks
//! - [`Extractor`]: tar entry materialization with path checks
//! - [`PackageInstaller`]: download → count → decompress → extract
//! - [`installed_usage`] / [`clear_installed`]: what is on disk under a root

mod extract;
mod installer;
mod package;
mod progress;
mod usage;

pub use extract::{ExtractionSummary, Extractor};
pub use installer::{InstallEvent, PackageInstaller};
pub use package::{ArchiveKind, PackageDescriptor, PackageManifest};
pub use progress::{CountingReader, ExtractionProgress, PROGRESS_INTERVAL};
pub use usage::{clear_installed, installed_usage, InstalledUsage};
