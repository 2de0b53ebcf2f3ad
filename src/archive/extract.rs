//! Streaming tar extraction.
//!
//! Entries are processed in stream order, straight from the reader; nothing
//! is staged or rolled back. A failure leaves the files written so far in
//! place and reports how many there were.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::package::ArchiveKind;
use crate::error::{ArchiveError, ExtractionFailure, NetworkError};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Totals of a completed extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Regular files written
    pub extracted_files: u64,

    /// Payload bytes written across all files
    pub extracted_bytes: u64,

    /// Directory entries created
    pub directories: u64,
}

/// Unpacks tar streams under a fixed destination root.
#[derive(Debug, Clone)]
pub struct Extractor {
    dest_root: PathBuf,
    cancel: CancellationToken,
}

impl Extractor {
    pub fn new(dest_root: impl Into<PathBuf>) -> Self {
        Self {
            dest_root: dest_root.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Abort between and within entries once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Extract an archive of the given kind. Gzip archives are decompressed
    /// on the fly; unknown kinds are read as plain tar.
    pub fn extract_kind<R: Read>(
        &self,
        reader: R,
        kind: ArchiveKind,
        package: &str,
    ) -> Result<ExtractionSummary, ExtractionFailure> {
        if kind.is_gzip() {
            self.extract(GzDecoder::new(reader), package)
        } else {
            self.extract(reader, package)
        }
    }

    /// Extract a plain tar stream.
    pub fn extract<R: Read>(
        &self,
        reader: R,
        package: &str,
    ) -> Result<ExtractionSummary, ExtractionFailure> {
        let mut summary = ExtractionSummary::default();

        match self.unpack(reader, &mut summary) {
            Ok(()) => {
                info!(
                    package = package,
                    files = summary.extracted_files,
                    bytes = summary.extracted_bytes,
                    "Extraction complete"
                );
                Ok(summary)
            }
            Err(error) => Err(ExtractionFailure {
                package: package.to_string(),
                extracted_files: summary.extracted_files,
                error,
            }),
        }
    }

    fn unpack<R: Read>(&self, reader: R, summary: &mut ExtractionSummary) -> Result<(), ArchiveError> {
        fs::create_dir_all(&self.dest_root).map_err(|e| write_error(&self.dest_root, e))?;

        let mut archive = Archive::new(reader);
        let entries = archive.entries().map_err(|e| self.classify(e))?;

        for entry in entries {
            if self.cancel.is_cancelled() {
                return Err(ArchiveError::Cancelled);
            }

            let mut entry = entry.map_err(|e| self.classify(e))?;
            let raw_path = entry
                .path()
                .map_err(|e| ArchiveError::Decode(format!("invalid entry path: {e}")))?
                .into_owned();
            let relative = safe_relative_path(&raw_path)?;
            if relative.as_os_str().is_empty() {
                continue;
            }
            let target = self.dest_root.join(&relative);
            let entry_type = entry.header().entry_type();

            match entry_type {
                EntryType::Directory => {
                    fs::create_dir_all(&target).map_err(|e| write_error(&target, e))?;
                    summary.directories += 1;
                    debug!(path = %relative.display(), "Created directory");
                }
                EntryType::Regular | EntryType::Continuous => {
                    let declared = entry.size();
                    let written = self.write_file(&mut entry, &target, declared)?;
                    summary.extracted_files += 1;
                    summary.extracted_bytes += written;
                    debug!(path = %relative.display(), bytes = written, "Extracted file");
                }
                other => {
                    debug!(path = %relative.display(), kind = ?other, "Skipping unsupported entry");
                }
            }
        }

        Ok(())
    }

    fn write_file<R: Read>(
        &self,
        entry: &mut R,
        target: &Path,
        declared: u64,
    ) -> Result<u64, ArchiveError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
        }
        let mut file = File::create(target).map_err(|e| write_error(target, e))?;

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;
        loop {
            let n = match entry.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.classify(e)),
            };
            file.write_all(&buf[..n]).map_err(|e| write_error(target, e))?;
            written += n as u64;
        }

        if written < declared {
            return Err(ArchiveError::Decode(format!(
                "truncated entry {}: expected {declared} bytes, got {written}",
                target.display()
            )));
        }

        file.flush().map_err(|e| write_error(target, e))?;
        Ok(written)
    }

    /// Attribute a read error to cancellation, the network, or the archive.
    fn classify(&self, err: io::Error) -> ArchiveError {
        if self.cancel.is_cancelled() {
            return ArchiveError::Cancelled;
        }
        match err.kind() {
            ErrorKind::ConnectionAborted => ArchiveError::Network(NetworkError::Body(err.to_string())),
            _ => ArchiveError::Decode(err.to_string()),
        }
    }
}

fn write_error(path: &Path, err: io::Error) -> ArchiveError {
    ArchiveError::Write {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Reject absolute paths and parent references; drop `.` components.
fn safe_relative_path(path: &Path) -> Result<PathBuf, ArchiveError> {
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::UnsafePath(path.display().to_string()));
            }
        }
    }
    Ok(relative)
}
