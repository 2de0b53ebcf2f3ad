//! Filesystem-backed entry store.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   3f/
//!     3f9a...e1.tile   payload bytes, verbatim
//!     3f9a...e1.json   EntryMeta sidecar (key, content-type, cached-date, size)
//! ```
//!
//! File names are the SHA-256 hex digest of the cache key; the first two hex
//! characters select a shard directory. Both files are written to `.tmp`
//! siblings and renamed into place, payload first, so a reader never sees a
//! partially written file. A sidecar whose `size` disagrees with the payload
//! on disk is treated as absent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::{CacheEntry, EntryMeta, EntryStore};
use crate::error::StorageError;
use crate::tile::CacheKey;

const PAYLOAD_EXTENSION: &str = "tile";
const META_EXTENSION: &str = "json";
const TEMP_SUFFIX: &str = "tmp";

/// Entry store persisting payloads under a root directory.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn paths_for(&self, key: &CacheKey) -> (PathBuf, PathBuf, PathBuf) {
        let digest = hex::encode(Sha256::digest(key.as_str().as_bytes()));
        let shard = self.root.join(&digest[..2]);
        let payload = shard.join(format!("{digest}.{PAYLOAD_EXTENSION}"));
        let meta = shard.join(format!("{digest}.{META_EXTENSION}"));
        (shard, payload, meta)
    }

    async fn read_meta(path: &Path) -> Result<Option<EntryMeta>, StorageError> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StorageError::CorruptMetadata {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    fs::write(path, contents)
        .await
        .map_err(|e| StorageError::io(path, e))
}

async fn rename_file(from: &Path, to: &Path) -> Result<(), StorageError> {
    fs::rename(from, to)
        .await
        .map_err(|e| StorageError::io(to, e))
}

async fn remove_if_exists(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[async_trait]
impl EntryStore for DiskStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StorageError> {
        let (_, payload_path, meta_path) = self.paths_for(key);

        let Some(meta) = Self::read_meta(&meta_path).await? else {
            return Ok(None);
        };
        if &meta.key != key {
            return Ok(None);
        }

        let payload = match fs::read(&payload_path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %payload_path.display(), "Sidecar without payload, ignoring entry");
                return Ok(None);
            }
            Err(e) => return Err(StorageError::io(&payload_path, e)),
        };

        if payload.len() as u64 != meta.size {
            warn!(
                path = %payload_path.display(),
                expected = meta.size,
                actual = payload.len(),
                "Payload size does not match sidecar, ignoring entry"
            );
            return Ok(None);
        }

        Ok(Some(CacheEntry { meta, payload }))
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let (shard, payload_path, meta_path) = self.paths_for(entry.key());

        fs::create_dir_all(&shard)
            .await
            .map_err(|e| StorageError::io(&shard, e))?;

        let meta = serde_json::to_vec(&entry.meta).map_err(|e| StorageError::CorruptMetadata {
            path: meta_path.clone(),
            message: e.to_string(),
        })?;

        let payload_tmp = temp_path(&payload_path);
        let meta_tmp = temp_path(&meta_path);

        let staged = async {
            write_file(&payload_tmp, &entry.payload).await?;
            write_file(&meta_tmp, &meta).await?;
            rename_file(&payload_tmp, &payload_path).await
        }
        .await;
        if let Err(e) = staged {
            let _ = remove_if_exists(&payload_tmp).await;
            let _ = remove_if_exists(&meta_tmp).await;
            return Err(e);
        }

        // New payload is live; without its sidecar the pair must not survive
        if let Err(e) = rename_file(&meta_tmp, &meta_path).await {
            let _ = remove_if_exists(&meta_tmp).await;
            let _ = remove_if_exists(&meta_path).await;
            let _ = remove_if_exists(&payload_path).await;
            return Err(e);
        }

        debug!(key = %entry.key(), bytes = entry.size(), "Wrote cache entry to disk");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let (_, payload_path, meta_path) = self.paths_for(key);
        let had_meta = remove_if_exists(&meta_path).await?;
        let had_payload = remove_if_exists(&payload_path).await?;
        Ok(had_meta || had_payload)
    }

    async fn scan(&self) -> Result<Vec<EntryMeta>, StorageError> {
        let mut metas = Vec::new();

        let mut shards = fs::read_dir(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;

        while let Some(shard) = shards
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let shard_path = shard.path();
            if !shard_path.is_dir() {
                continue;
            }

            let mut files = fs::read_dir(&shard_path)
                .await
                .map_err(|e| StorageError::io(&shard_path, e))?;

            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| StorageError::io(&shard_path, e))?
            {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some(META_EXTENSION) {
                    continue;
                }

                match Self::read_meta(&path).await {
                    Ok(Some(meta)) => metas.push(meta),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Skipping unreadable cache sidecar"),
                }
            }
        }

        Ok(metas)
    }
}
