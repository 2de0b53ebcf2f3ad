//! Cache-first tile fetch policy.
//!
//! Every request routed through the agent goes through [`TileService::fetch`]:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          TileService                             │
//! │                                                                  │
//! │  is_tile_request? ──no──► upstream, uncached (Bypass)            │
//! │        │ yes                                                     │
//! │        ▼                                                         │
//! │  TileCache::get ──hit, age < window──► cached (Fresh)            │
//! │        │                                                         │
//! │        ├──hit, age ≥ window──► upstream ok? ──yes──► Refreshed   │
//! │        │                                   └─no───► StaleFallback│
//! │        │                                                         │
//! │        └──miss──► upstream ok? ──yes──► store (Miss)             │
//! │                        │  └─HTTP error──► passed through         │
//! │                        └─network error──► 404 "not available"    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A growing write schedules an eviction pass on a background task. Two
//! concurrent misses for the same key both go to the network.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::TileError;
use crate::io::{Upstream, UpstreamResponse};
use crate::store::CacheEntry;

use super::cache::{CacheKey, TileCache};
use super::pattern::is_tile_request;

/// Default freshness window in days.
pub const DEFAULT_FRESHNESS_DAYS: u32 = 30;

// =============================================================================
// Tile Response
// =============================================================================

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a cached entry younger than the freshness window
    Fresh,
    /// Cached entry was stale and has been replaced from the network
    Refreshed,
    /// Nothing cached; fetched from the network
    Miss,
    /// Cached entry was stale and the network failed, served anyway
    StaleFallback,
    /// Not a tile request; cache not consulted
    Bypass,
}

impl CacheStatus {
    /// Value used in the `x-tile-cache` response header.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Fresh => "fresh",
            CacheStatus::Refreshed => "refreshed",
            CacheStatus::Miss => "miss",
            CacheStatus::StaleFallback => "stale",
            CacheStatus::Bypass => "bypass",
        }
    }
}

/// Response from the fetch policy.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// Payload bytes
    pub data: Bytes,

    /// Content type reported by the upstream when the payload was fetched
    pub content_type: Option<String>,

    /// HTTP status to answer with
    pub status: u16,

    /// How the response was produced
    pub cache_status: CacheStatus,

    /// `cached-date` of the entry backing the response, if it came from or
    /// went into the cache
    pub cached_date: Option<DateTime<Utc>>,
}

impl TileResponse {
    fn from_entry(entry: CacheEntry, cache_status: CacheStatus) -> Self {
        Self {
            cached_date: Some(entry.cached_date()),
            content_type: entry.meta.content_type,
            data: entry.payload,
            status: 200,
            cache_status,
        }
    }

    fn uncached(response: UpstreamResponse, cache_status: CacheStatus) -> Self {
        Self {
            data: response.body,
            content_type: response.content_type,
            status: response.status,
            cache_status,
            cached_date: None,
        }
    }
}

// =============================================================================
// Tile Service
// =============================================================================

/// Cache-first fetcher for map tiles.
pub struct TileService {
    cache: Arc<TileCache>,
    upstream: Arc<dyn Upstream>,
    freshness: Duration,
}

impl TileService {
    /// Create a service with the default 30 day freshness window.
    pub fn new(cache: Arc<TileCache>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            cache,
            upstream,
            freshness: Duration::days(DEFAULT_FRESHNESS_DAYS as i64),
        }
    }

    /// Set the age at which a cached entry becomes stale.
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Shared cache handle.
    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    /// Shared upstream handle.
    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Resolve a request URL.
    ///
    /// # Errors
    ///
    /// - [`TileError::InvalidUrl`] for an empty URL
    /// - [`TileError::NotAvailableOffline`] for a tile that is neither cached
    ///   nor reachable
    /// - [`TileError::Upstream`] for a non-tile request the network could not serve
    pub async fn fetch(&self, url: &str) -> Result<TileResponse, TileError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(TileError::InvalidUrl("empty URL".to_string()));
        }

        if !is_tile_request(url) {
            let response = self.upstream.fetch(url).await?;
            return Ok(TileResponse::uncached(response, CacheStatus::Bypass));
        }

        let key = CacheKey::from_url(url);
        let cached = match self.cache.get(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        };

        match cached {
            Some(entry) if self.is_fresh(entry.cached_date()) => {
                debug!(key = %key, "Tile cache hit (fresh)");
                Ok(TileResponse::from_entry(entry, CacheStatus::Fresh))
            }
            Some(stale) => Ok(self.refresh(key, url, stale).await),
            None => self.fetch_miss(key, url).await,
        }
    }

    fn is_fresh(&self, cached_date: DateTime<Utc>) -> bool {
        Utc::now().signed_duration_since(cached_date) < self.freshness
    }

    async fn refresh(&self, key: CacheKey, url: &str, stale: CacheEntry) -> TileResponse {
        match self.upstream.fetch(url).await {
            Ok(response) if response.is_success() => {
                debug!(key = %key, "Stale tile refreshed");
                let entry = self.store(key, response).await;
                TileResponse::from_entry(entry, CacheStatus::Refreshed)
            }
            Ok(response) => {
                warn!(key = %key, status = response.status, "Refresh rejected upstream, serving stale tile");
                TileResponse::from_entry(stale, CacheStatus::StaleFallback)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Refresh failed, serving stale tile");
                TileResponse::from_entry(stale, CacheStatus::StaleFallback)
            }
        }
    }

    async fn fetch_miss(&self, key: CacheKey, url: &str) -> Result<TileResponse, TileError> {
        match self.upstream.fetch(url).await {
            Ok(response) if response.is_success() => {
                debug!(key = %key, bytes = response.body.len(), "Tile cache miss, fetched");
                let entry = self.store(key, response).await;
                Ok(TileResponse::from_entry(entry, CacheStatus::Miss))
            }
            Ok(response) => {
                debug!(key = %key, status = response.status, "Upstream refused tile, not caching");
                Ok(TileResponse::uncached(response, CacheStatus::Miss))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Tile not cached and network unavailable");
                Err(TileError::NotAvailableOffline {
                    url: url.to_string(),
                })
            }
        }
    }

    /// Write a fetched payload. Storage failures are logged; the entry is
    /// returned either way so the caller can still answer with it.
    async fn store(&self, key: CacheKey, response: UpstreamResponse) -> CacheEntry {
        let entry = CacheEntry::new(key, response.body, response.content_type);

        match self.cache.put(entry.clone()).await {
            Ok(outcome) if outcome.grew => self.schedule_eviction(),
            Ok(_) => {}
            Err(e) => warn!(key = %entry.key(), error = %e, "Failed to cache tile"),
        }

        entry
    }

    fn schedule_eviction(&self) {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            if let Err(e) = cache.evict().await {
                warn!(error = %e, "Eviction pass failed");
            }
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
