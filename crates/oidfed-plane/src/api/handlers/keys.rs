//! Signing Key Handlers

use axum::{extract::State, Json};
use oidfed_core::KeyPair;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::api::error::ApiError;

/// Request to rotate the signing key
#[derive(Debug, Default, Deserialize)]
pub struct RotateKeyRequest {
    /// Key identifier of the new key (generated when absent)
    #[serde(default)]
    pub kid: Option<String>,

    /// Number of retired keys to keep publishing
    #[serde(default)]
    pub keep_retired: Option<usize>,
}

/// Response from key rotation
#[derive(Debug, Serialize, Deserialize)]
pub struct RotateKeyResponse {
    /// Key identifier of the new signing key
    pub kid: String,

    /// Key identifier of the key that was replaced
    pub retired: String,

    /// Key identifiers still published as retired
    pub published_retired: Vec<String>,
}

/// Rotate the signing key
///
/// POST /v1/keys/rotate
///
/// The replaced key stays in the published `jwks` so statements signed with
/// it keep verifying until they expire.
pub async fn rotate_key(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RotateKeyRequest>,
) -> Result<Json<RotateKeyResponse>, ApiError> {
    let kid = request
        .kid
        .unwrap_or_else(|| format!("oidfed-{}", uuid::Uuid::new_v4()));
    if kid.is_empty() || kid.len() > 256 {
        return Err(ApiError::BadRequest(
            "Key ID must be between 1 and 256 characters".into(),
        ));
    }
    if kid == state.registry.kid() || state.registry.retired_kids().contains(&kid) {
        return Err(ApiError::Conflict(format!("Key ID '{}' is already in use", kid)));
    }

    let retired = state.registry.rotate(KeyPair::generate(kid.clone()));
    if let Some(keep) = request.keep_retired {
        state.registry.prune_retired(keep);
    }

    Ok(Json(RotateKeyResponse {
        kid,
        retired,
        published_retired: state.registry.retired_kids(),
    }))
}
