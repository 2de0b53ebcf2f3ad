//! Offline tile cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         HTTP Handlers / Admin           │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileService                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  pattern     │  │   TileCache     │  │
//! │  │  (is tile?)  │  │   (index +      │  │
//! │  │              │  │    budget)      │  │
//! │  └──────────────┘  └────────┬────────┘  │
//! └──────────┬──────────────────┼───────────┘
//!            │                  │
//!            ▼                  ▼
//! ┌───────────────────┐ ┌───────────────────┐
//! │     Upstream      │ │    EntryStore     │
//! │  (tile servers)   │ │ (memory / disk)   │
//! └───────────────────┘ └───────────────────┘
//! ```
//!
//! # Components
//!
//! - [`is_tile_request`]: URL classification
//! - [`TileCache`]: indexed, budgeted store with quartile eviction
//! - [`CacheKey`]: normalized request identity
//! - [`TileService`]: cache-first fetch policy with stale fallback

mod cache;
mod pattern;
mod service;

pub use cache::{
    usage_percent, CacheKey, CacheStats, EvictionReport, PutOutcome, TileCache,
    DEFAULT_MAX_CACHE_BYTES,
};
pub use pattern::is_tile_request;
pub use service::{CacheStatus, TileResponse, TileService, DEFAULT_FRESHNESS_DAYS};
