//! Bearer token authentication for the admin endpoint.
//!
//! When an admin token is configured, `POST /admin` requires:
//!
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! The presented token is compared in constant time. Tile fetches and the
//! health check are never guarded.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::handlers::ErrorResponse;

// =============================================================================
// Types
// =============================================================================

/// Authentication error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header
    MissingToken,

    /// Header present but not of the form `Bearer <token>`
    MalformedHeader,

    /// Token does not match
    InvalidToken,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing admin token"),
            AuthError::MalformedHeader => write!(f, "Malformed Authorization header"),
            AuthError::InvalidToken => write!(f, "Invalid admin token"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "missing_token"),
            AuthError::MalformedHeader => (StatusCode::BAD_REQUEST, "malformed_authorization"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
        };
        let message = self.to_string();

        // A wrong token may be someone probing the endpoint
        match &self {
            AuthError::InvalidToken => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Admin Token
// =============================================================================

/// Shared secret required on admin requests.
#[derive(Clone)]
pub struct AdminToken {
    token: Vec<u8>,
}

impl AdminToken {
    pub fn new(token: impl AsRef<[u8]>) -> Self {
        Self {
            token: token.as_ref().to_vec(),
        }
    }

    /// Check a presented token in constant time.
    pub fn verify(&self, presented: &str) -> Result<(), AuthError> {
        if bool::from(self.token.as_slice().ct_eq(presented.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }

    /// Check the value of an `Authorization` header.
    pub fn verify_header(&self, header: Option<&str>) -> Result<(), AuthError> {
        let header = header.ok_or(AuthError::MissingToken)?;
        let presented = bearer_token(header).ok_or(AuthError::MalformedHeader)?;
        self.verify(presented)
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminToken").finish_non_exhaustive()
    }
}

/// Extract the credential from `Bearer <token>`. The scheme is case-insensitive.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// =============================================================================
// Middleware
// =============================================================================

/// Axum middleware rejecting requests without the admin token.
///
/// Use with `middleware::from_fn_with_state(token, auth_middleware)`.
pub async fn auth_middleware(
    State(token): State<AdminToken>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::MalformedHeader))
        .transpose()?;

    token.verify_header(header)?;

    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
