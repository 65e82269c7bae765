//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use oidfed_core::{FederationError, PolicyError};
use serde::Serialize;
use thiserror::Error;

use crate::issuer::IssueError;
use crate::storage::StorageError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unknown trust anchor: {0}")]
    UnknownTrustAnchor(String),

    #[error("No valid trust chain: {0}")]
    NoTrustChain(String),

    #[error("Metadata policy error")]
    Policy(PolicyError),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone(), None),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
                None,
            ),
            ApiError::UnknownTrustAnchor(id) => (
                StatusCode::NOT_FOUND,
                "UNKNOWN_TRUST_ANCHOR",
                format!("Trust anchor '{}' is not configured", id),
                None,
            ),
            ApiError::NoTrustChain(sub) => (
                StatusCode::NOT_FOUND,
                "NO_TRUST_CHAIN",
                format!("No valid trust chain for '{}'", sub),
                None,
            ),
            ApiError::Policy(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "POLICY_ERROR",
                err.to_string(),
                Some(serde_json::json!({ "kind": policy_kind(err) })),
            ),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

fn policy_kind(err: &PolicyError) -> &'static str {
    match err {
        PolicyError::Conflict { .. } => "conflict",
        PolicyError::IncompatibleOperators { .. } => "incompatible_operators",
        PolicyError::Inconsistent { .. } => "inconsistent",
        PolicyError::Violation { .. } => "violation",
        PolicyError::InvalidOperatorValue { .. } => "invalid_operator_value",
        PolicyError::UnsupportedCritical { .. } => "unsupported_critical",
    }
}

impl From<FederationError> for ApiError {
    fn from(err: FederationError) -> Self {
        match err {
            FederationError::Policy(e) => ApiError::Policy(e),
            FederationError::InvalidStatement(msg) | FederationError::SerializationError(msg) => {
                ApiError::BadRequest(msg)
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(id),
            StorageError::AlreadyExists(id) => {
                ApiError::Conflict(format!("Subordinate '{}' is already registered", id))
            }
            StorageError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Federation(e) => e.into(),
            IssueError::Storage(e) => e.into(),
        }
    }
}
