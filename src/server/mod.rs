//! HTTP server layer for the tile agent.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        GET /fetch?url=...        POST /admin      GET /health   │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │(admin token)│  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!           │                  │
//!           ▼                  ▼
//!      TileService       AdminHandle ──► AdminWorker
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{auth_middleware, AdminToken, AuthError};
pub use handlers::{
    admin_handler, fetch_handler, health_handler, AppState, ErrorResponse, FetchParams,
    HandlerError, HealthResponse, CACHED_DATE_HEADER, TILE_CACHE_HEADER,
};
pub use routes::{create_router, RouterConfig};
