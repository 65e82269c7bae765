//! Bearer token check for the management endpoints

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use super::error::ApiError;
use super::handlers::AppState;

/// Reject requests whose `Authorization: Bearer` token is not the configured
/// admin token
pub async fn require_admin_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.admin_token.as_ref() else {
        return Err(ApiError::Unauthorized("Management endpoints are disabled".into()));
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if expected.matches(token) => Ok(next.run(request).await),
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected management request with wrong token");
            Err(ApiError::Unauthorized("Invalid bearer token".into()))
        }
        None => Err(ApiError::Unauthorized("Missing bearer token".into())),
    }
}
