//! Router configuration for the tile agent.
//!
//! # Route Structure
//!
//! ```text
//! /health              - Health check (public)
//! /fetch?url={url}     - Tile fetch policy (public)
//! /admin               - Admin channel (bearer token when configured)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tiledepot::server::{create_router, AppState, RouterConfig};
//!
//! let state = AppState::new(tile_service, admin_handle);
//! let config = RouterConfig::new().with_admin_token("my-admin-token");
//!
//! let router = create_router(state, config);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, AdminToken};
use super::handlers::{admin_handler, fetch_handler, health_handler, AppState};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone, Default)]
pub struct RouterConfig {
    /// Bearer token required on `POST /admin` (None = open)
    pub admin_token: Option<String>,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default:
    /// - The admin endpoint is open
    /// - CORS allows any origin
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            admin_token: None,
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Require `Authorization: Bearer <token>` on admin requests.
    ///
    /// An empty token leaves the endpoint open.
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.admin_token = (!token.is_empty()).then_some(token);
        self
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router(state: AppState, config: RouterConfig) -> Router {
    let cors = build_cors_layer(&config);

    let mut admin_routes = Router::new()
        .route("/admin", post(admin_handler))
        .with_state(state.clone());
    if let Some(token) = &config.admin_token {
        admin_routes = admin_routes.layer(middleware::from_fn_with_state(
            AdminToken::new(token),
            auth_middleware,
        ));
    }

    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/fetch", get(fetch_handler))
        .with_state(state);

    let router = Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
