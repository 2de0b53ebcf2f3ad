//! Storage backends for cached tile entries.
//!
//! The tile cache keeps its index and byte accounting in memory and delegates
//! payload persistence to an [`EntryStore`]. Two backends are provided:
//!
//! - [`MemoryStore`]: process memory only, lost on restart
//! - [`DiskStore`]: one payload file plus one JSON sidecar per entry

mod disk;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::tile::CacheKey;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Metadata persisted alongside every payload.
///
/// `cached_date` is serialized as `cached-date` in RFC 3339 form and is the
/// only timestamp used for freshness and eviction order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    pub key: CacheKey,

    #[serde(rename = "content-type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(rename = "cached-date")]
    pub cached_date: DateTime<Utc>,

    pub size: u64,
}

/// A cached tile payload with its metadata.
///
/// Entries are never mutated in place; a refresh writes a new entry under the
/// same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub meta: EntryMeta,
    pub payload: Bytes,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    pub fn new(key: CacheKey, payload: Bytes, content_type: Option<String>) -> Self {
        Self::with_date(key, payload, content_type, Utc::now())
    }

    /// Create an entry with an explicit `cached-date`.
    pub fn with_date(
        key: CacheKey,
        payload: Bytes,
        content_type: Option<String>,
        cached_date: DateTime<Utc>,
    ) -> Self {
        Self {
            meta: EntryMeta {
                key,
                content_type,
                cached_date,
                size: payload.len() as u64,
            },
            payload,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.meta.key
    }

    pub fn size(&self) -> u64 {
        self.meta.size
    }

    pub fn cached_date(&self) -> DateTime<Utc> {
        self.meta.cached_date
    }
}

/// Key-addressed persistence for cache entries.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Load the entry stored under `key`.
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StorageError>;

    /// Write an entry, replacing any previous entry with the same key.
    async fn store(&self, entry: &CacheEntry) -> Result<(), StorageError>;

    /// Remove an entry. Returns `false` if nothing was stored under `key`.
    async fn remove(&self, key: &CacheKey) -> Result<bool, StorageError>;

    /// Metadata of every stored entry, used to rebuild the index on startup.
    async fn scan(&self) -> Result<Vec<EntryMeta>, StorageError>;
}
