//! Budgeted tile cache.
//!
//! The cache keeps an in-memory index of every stored entry (key, size,
//! `cached-date`) plus a running byte total, and delegates payloads to an
//! [`EntryStore`] backend.
//!
//! # Size Accounting
//!
//! The total is adjusted on every put and delete, so reading it never walks
//! the store. Between a growing put and the next eviction pass the total may
//! exceed the configured maximum.
//!
//! # Eviction
//!
//! An eviction pass runs only when the total is over budget. It orders
//! entries by `(cached-date, key)` and removes the oldest quarter
//! (`floor(n / 4)`), so caches with fewer than four entries are never
//! trimmed. Passes are serialized; writes may continue while one runs, and an
//! entry replaced after the pass took its snapshot survives.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::StorageError;
use crate::store::{CacheEntry, EntryMeta, EntryStore, MemoryStore};

/// Default storage budget: 500 MiB
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 500 * 1024 * 1024;

// =============================================================================
// Cache Key
// =============================================================================

/// Normalized identity of a cached request.
///
/// Built from the request URL with the fragment removed. Scheme and host are
/// lower-cased by URL parsing; the query string is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Normalize a request URL into a cache key.
    ///
    /// Input that does not parse as an absolute URL is used as-is after
    /// trimming whitespace.
    pub fn from_url(url: &str) -> Self {
        let trimmed = url.trim();
        match Url::parse(trimmed) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                CacheKey(parsed.into())
            }
            Err(_) => CacheKey(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Result of a [`TileCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    /// Whether the running total increased
    pub grew: bool,

    /// Size of the entry that was replaced, if any
    pub replaced_bytes: Option<u64>,
}

/// Result of an eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Entries removed
    pub removed: usize,

    /// Bytes released by the removed entries
    pub freed_bytes: u64,

    /// Running total once the pass finished
    pub total_bytes: u64,
}

/// Point-in-time usage of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub usage_percent: u64,
}

/// `round(total / max * 100)`. A zero budget reports 0 when empty and 100 otherwise.
pub fn usage_percent(total_bytes: u64, max_bytes: u64) -> u64 {
    if max_bytes == 0 {
        return if total_bytes == 0 { 0 } else { 100 };
    }
    (total_bytes as f64 / max_bytes as f64 * 100.0).round() as u64
}

// =============================================================================
// Tile Cache
// =============================================================================

#[derive(Default)]
struct CacheIndex {
    entries: HashMap<CacheKey, EntryMeta>,
    total_bytes: u64,
}

/// Cache of tile payloads with a byte budget.
///
/// Shared across the fetch policy, admin worker and HTTP handlers via `Arc`.
pub struct TileCache {
    store: Arc<dyn EntryStore>,
    index: RwLock<CacheIndex>,
    max_bytes: u64,
    eviction: Mutex<()>,
}

impl TileCache {
    /// Create a cache over `store`, rebuilding the index from its contents.
    pub async fn open(store: Arc<dyn EntryStore>, max_bytes: u64) -> Result<Self, StorageError> {
        let mut index = CacheIndex::default();
        for meta in store.scan().await? {
            index.total_bytes += meta.size;
            if let Some(previous) = index.entries.insert(meta.key.clone(), meta) {
                index.total_bytes -= previous.size;
            }
        }

        info!(
            entries = index.entries.len(),
            total_bytes = index.total_bytes,
            max_bytes = max_bytes,
            "Tile cache opened"
        );

        Ok(Self {
            store,
            index: RwLock::new(index),
            max_bytes,
            eviction: Mutex::new(()),
        })
    }

    /// Create an empty cache held in process memory.
    pub fn in_memory(max_bytes: u64) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            index: RwLock::new(CacheIndex::default()),
            max_bytes,
            eviction: Mutex::new(()),
        }
    }

    /// Look up an entry.
    ///
    /// The index read guard is held while the payload is loaded, so a
    /// concurrent `put` of the same key cannot interleave with the read.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StorageError> {
        let (seen, entry) = {
            let index = self.index.read().await;
            let Some(meta) = index.entries.get(key) else {
                return Ok(None);
            };
            (meta.clone(), self.store.load(key).await?)
        };

        if entry.is_none() {
            // Backend lost the entry behind our back; forget it unless it was rewritten since
            let mut index = self.index.write().await;
            if index.entries.get(key) == Some(&seen) {
                index.entries.remove(key);
                index.total_bytes = index.total_bytes.saturating_sub(seen.size);
            }
        }
        Ok(entry)
    }

    /// Insert or replace an entry.
    pub async fn put(&self, entry: CacheEntry) -> Result<PutOutcome, StorageError> {
        let mut index = self.index.write().await;
        self.store.store(&entry).await?;

        let size = entry.size();
        let replaced_bytes = index
            .entries
            .insert(entry.key().clone(), entry.meta)
            .map(|previous| previous.size);

        let before = index.total_bytes;
        index.total_bytes = before.saturating_sub(replaced_bytes.unwrap_or(0)) + size;

        Ok(PutOutcome {
            grew: index.total_bytes > before,
            replaced_bytes,
        })
    }

    /// Remove an entry. Returns `false` if the key was not cached.
    pub async fn delete(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let mut index = self.index.write().await;
        if !index.entries.contains_key(key) {
            return Ok(false);
        }

        self.store.remove(key).await?;
        if let Some(meta) = index.entries.remove(key) {
            index.total_bytes = index.total_bytes.saturating_sub(meta.size);
        }
        Ok(true)
    }

    /// Remove every entry.
    ///
    /// Entries that fail to delete are logged and left in place; the return
    /// value counts only the removed ones.
    pub async fn delete_all(&self) -> Result<usize, StorageError> {
        let keys: Vec<CacheKey> = self.index.read().await.entries.keys().cloned().collect();

        let mut removed = 0;
        for key in keys {
            match self.delete(&key).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to delete cache entry"),
            }
        }

        info!(removed = removed, "Cache cleared");
        Ok(removed)
    }

    /// Running total of payload bytes.
    pub async fn total_size(&self) -> u64 {
        self.index.read().await.total_bytes
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.index.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Configured storage budget in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Snapshot of the current usage.
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.read().await;
        CacheStats {
            entry_count: index.entries.len(),
            total_bytes: index.total_bytes,
            max_bytes: self.max_bytes,
            usage_percent: usage_percent(index.total_bytes, self.max_bytes),
        }
    }

    /// Run an eviction pass against the configured budget.
    pub async fn evict(&self) -> Result<EvictionReport, StorageError> {
        self.evict_if_over_budget(self.max_bytes).await
    }

    /// Remove the oldest quarter of entries if the total exceeds `max_bytes`.
    pub async fn evict_if_over_budget(&self, max_bytes: u64) -> Result<EvictionReport, StorageError> {
        let _pass = self.eviction.lock().await;

        let mut victims: Vec<EntryMeta> = {
            let index = self.index.read().await;
            if index.total_bytes <= max_bytes {
                return Ok(EvictionReport {
                    total_bytes: index.total_bytes,
                    ..Default::default()
                });
            }
            index.entries.values().cloned().collect()
        };

        let quota = victims.len() / 4;
        victims.sort_by(|a, b| {
            a.cached_date
                .cmp(&b.cached_date)
                .then_with(|| a.key.cmp(&b.key))
        });
        victims.truncate(quota);

        let mut report = EvictionReport::default();
        for victim in victims {
            let mut index = self.index.write().await;

            // Skip entries rewritten since the snapshot
            let unchanged = index
                .entries
                .get(&victim.key)
                .is_some_and(|current| current.cached_date == victim.cached_date);
            if !unchanged {
                continue;
            }

            match self.store.remove(&victim.key).await {
                Ok(_) => {
                    index.entries.remove(&victim.key);
                    index.total_bytes = index.total_bytes.saturating_sub(victim.size);
                    report.removed += 1;
                    report.freed_bytes += victim.size;
                    debug!(key = %victim.key, bytes = victim.size, "Evicted cache entry");
                }
                Err(e) => warn!(key = %victim.key, error = %e, "Failed to evict cache entry"),
            }
        }

        report.total_bytes = self.index.read().await.total_bytes;
        info!(
            removed = report.removed,
            freed_bytes = report.freed_bytes,
            total_bytes = report.total_bytes,
            max_bytes = max_bytes,
            "Eviction pass complete"
        );
        Ok(report)
    }
}

// =============================================================================
// Tests
// =============================================================================
