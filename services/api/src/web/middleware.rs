//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use eduquest_core::ports::PortError;
use std::sync::Arc;
use tracing::{error, warn};

use crate::web::state::ServiceState;

/// Middleware that validates the bearer access token.
///
/// If valid, inserts the `Session` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<ServiceState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let session = state.auth.validate_token(token).await.map_err(|e| match e {
        PortError::Unauthorized => {
            warn!("Rejected an unknown or expired access token");
            StatusCode::UNAUTHORIZED
        }
        other => {
            error!("Failed to validate access token: {:?}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}
