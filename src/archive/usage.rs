//! Disk usage of installed packages.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::StorageError;

/// Bytes and regular files found under an extraction root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstalledUsage {
    pub total_bytes: u64,
    pub file_count: u64,
}

impl InstalledUsage {
    /// Size in MiB, for display.
    pub fn total_mib(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Walk `root` and total the regular files beneath it.
///
/// A missing root counts as empty. Symlinks are not followed.
pub fn installed_usage(root: &Path) -> Result<InstalledUsage, StorageError> {
    let mut usage = InstalledUsage::default();
    match fs::symlink_metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Ok(usage),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(usage),
        Err(e) => return Err(StorageError::io(root, e)),
    }

    accumulate(root, &mut usage)?;
    Ok(usage)
}

fn accumulate(dir: &Path, usage: &mut InstalledUsage) -> Result<(), StorageError> {
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let path = entry.path();
        let meta = fs::symlink_metadata(&path).map_err(|e| StorageError::io(&path, e))?;

        if meta.is_file() {
            usage.total_bytes += meta.len();
            usage.file_count += 1;
        } else if meta.is_dir() {
            accumulate(&path, usage)?;
        }
    }
    Ok(())
}

/// Remove everything under `root`, keeping the directory itself.
///
/// Returns the usage that was released.
pub fn clear_installed(root: &Path) -> Result<InstalledUsage, StorageError> {
    let usage = installed_usage(root)?;
    if usage == InstalledUsage::default() && !root.is_dir() {
        return Ok(usage);
    }

    for entry in fs::read_dir(root).map_err(|e| StorageError::io(root, e))? {
        let entry = entry.map_err(|e| StorageError::io(root, e))?;
        let path = entry.path();
        let meta = fs::symlink_metadata(&path).map_err(|e| StorageError::io(&path, e))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| StorageError::io(&path, e))?;
    }

    info!(
        root = %root.display(),
        files = usage.file_count,
        bytes = usage.total_bytes,
        "Cleared installed packages"
    );
    Ok(usage)
}
