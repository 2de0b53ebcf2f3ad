//! HTTP request handlers for the tile agent.
//!
//! # Endpoints
//!
//! - `GET /fetch?url={url}` - Resolve a URL through the tile fetch policy
//! - `POST /admin` - Admin channel (cache status, clear, bulk download)
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::admin::{AdminHandle, AdminMessage, AdminReply};
use crate::error::TileError;
use crate::tile::TileService;

/// Header carrying the entry's `cached-date` (RFC 3339).
pub const CACHED_DATE_HEADER: &str = "cached-date";

/// Header describing how the response was produced (fresh, miss, ...).
pub const TILE_CACHE_HEADER: &str = "x-tile-cache";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Fetch policy over the shared tile cache
    pub tile_service: Arc<TileService>,

    /// Sender side of the admin channel
    pub admin: AdminHandle,
}

impl AppState {
    pub fn new(tile_service: Arc<TileService>, admin: AdminHandle) -> Self {
        Self {
            tile_service,
            admin,
        }
    }
}

// =============================================================================
// Request / Response Types
// =============================================================================

/// Query parameters for `GET /fetch`.
#[derive(Debug, Deserialize)]
pub struct FetchParams {
    /// Upstream URL to resolve
    pub url: String,
}

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_available_offline", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// 5xx errors are logged at ERROR, 404s at DEBUG and other 4xx at WARN.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::NotAvailableOffline { .. } => {
                (StatusCode::NOT_FOUND, "not_available_offline")
            }
            TileError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            TileError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

/// Wrapper for handler errors to implement IntoResponse.
pub struct HandlerError(pub TileError);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

impl From<TileError> for HandlerError {
    fn from(err: TileError) -> Self {
        HandlerError(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle fetch requests.
///
/// # Endpoint
///
/// `GET /fetch?url={url}`
///
/// # Response
///
/// The payload with the upstream status and content type, plus:
///
/// - `cached-date`: when the backing entry was stored (cached tiles only)
/// - `x-tile-cache`: `fresh`, `refreshed`, `miss`, `stale` or `bypass`
///
/// # Errors
///
/// - `400 Bad Request`: empty URL
/// - `404 Not Found`: tile neither cached nor reachable
/// - `502 Bad Gateway`: non-tile request the network could not serve
pub async fn fetch_handler(
    State(state): State<AppState>,
    Query(params): Query<FetchParams>,
) -> Result<Response, HandlerError> {
    let response = state.tile_service.fetch(&params.url).await?;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    let content_type = response
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        TILE_CACHE_HEADER,
        HeaderValue::from_static(response.cache_status.as_str()),
    );
    if let Some(cached_date) = response.cached_date {
        if let Ok(value) = HeaderValue::from_str(&cached_date.to_rfc3339()) {
            headers.insert(CACHED_DATE_HEADER, value);
        }
    }

    Ok((status, headers, response.data).into_response())
}

/// Handle admin messages.
///
/// # Endpoint
///
/// `POST /admin` with a JSON body `{"id"?, "type", "data"?}`
///
/// # Response
///
/// `200 OK` with the reply `{"id"?, "success", "result" | "status" | "error"}`.
/// Failures are reported in the body, not the status code; that includes a
/// body that is not a valid admin message.
pub async fn admin_handler(
    State(state): State<AppState>,
    message: Result<Json<AdminMessage>, JsonRejection>,
) -> Json<AdminReply> {
    match message {
        Ok(Json(message)) => Json(state.admin.send(message).await),
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected malformed admin message");
            Json(AdminReply::failure(None, rejection.body_text()))
        }
    }
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
