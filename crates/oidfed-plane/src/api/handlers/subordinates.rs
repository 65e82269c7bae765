//! Subordinate Management Handlers
//!
//! Handles registration, listing and removal of subordinate entities.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use oidfed_core::{Constraints, EntityType, JwkSet, MetadataPolicies};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::AppState;
use crate::api::error::ApiError;
use crate::storage::SubordinateInfo;

/// Request to register a subordinate
#[derive(Debug, Deserialize)]
pub struct RegisterSubordinateRequest {
    /// Entity identifier of the subordinate
    pub entity_id: String,

    /// Federation keys of the subordinate
    pub jwks: JwkSet,

    /// Entity types the subordinate operates as
    #[serde(default)]
    pub entity_types: Vec<EntityType>,

    /// Policy placed on the subordinate's metadata
    #[serde(default)]
    pub metadata_policy: MetadataPolicies,

    /// Policy operators the subordinate must understand
    #[serde(default)]
    pub metadata_policy_crit: Vec<String>,

    /// Constraints on the chain below the subordinate
    #[serde(default)]
    pub constraints: Option<Constraints>,
}

/// Response from subordinate registration
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterSubordinateResponse {
    /// Whether the subordinate is registered after the call
    pub registered: bool,

    /// Entity identifier
    pub entity_id: String,

    /// Message
    pub message: String,
}

/// Subordinate entry in listing
#[derive(Debug, Serialize, Deserialize)]
pub struct SubordinateEntry {
    pub entity_id: String,
    pub entity_types: Vec<EntityType>,
    pub registered_at: String,
}

/// Response listing subordinates
#[derive(Debug, Serialize, Deserialize)]
pub struct ListSubordinatesResponse {
    /// Registered subordinates
    pub subordinates: Vec<SubordinateEntry>,

    /// Total count
    pub count: usize,
}

/// Register a subordinate
///
/// POST /v1/subordinates
///
/// The metadata policy is checked for consistency before it is accepted, so
/// the fetch endpoint never publishes a policy no chain could satisfy.
pub async fn register_subordinate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterSubordinateRequest>,
) -> Result<Json<RegisterSubordinateResponse>, ApiError> {
    let entity_id = request.entity_id.trim_end_matches('/').to_string();
    if !(entity_id.starts_with("https://") || entity_id.starts_with("http://")) {
        return Err(ApiError::BadRequest(format!(
            "Entity identifier must be an http(s) URL: '{}'",
            request.entity_id
        )));
    }
    if entity_id == state.config.entity_id {
        return Err(ApiError::BadRequest(
            "An entity cannot be its own subordinate".into(),
        ));
    }
    if request.jwks.keys.is_empty() {
        return Err(ApiError::BadRequest("jwks must contain at least one key".into()));
    }

    let engine = state.resolver.policy_engine();
    engine
        .check_critical(&request.metadata_policy_crit)
        .map_err(ApiError::Policy)?;
    engine
        .combine_policies(&MetadataPolicies::new(), &request.metadata_policy)
        .map_err(ApiError::Policy)?;

    let info = SubordinateInfo {
        entity_id: entity_id.clone(),
        jwks: request.jwks,
        entity_types: request.entity_types,
        metadata_policy: request.metadata_policy,
        metadata_policy_crit: request.metadata_policy_crit,
        constraints: request.constraints,
        registered_at: Utc::now(),
    };
    state.store.register(info).await?;

    info!(entity_id = %entity_id, "Registered subordinate");

    Ok(Json(RegisterSubordinateResponse {
        registered: true,
        entity_id,
        message: "Subordinate registered successfully".to_string(),
    }))
}

/// List registered subordinates
///
/// GET /v1/subordinates
pub async fn list_subordinates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListSubordinatesResponse>, ApiError> {
    let mut subordinates = Vec::new();
    for entity_id in state.store.list(None).await? {
        if let Some(info) = state.store.get(&entity_id).await? {
            subordinates.push(SubordinateEntry {
                entity_id: info.entity_id,
                entity_types: info.entity_types,
                registered_at: info.registered_at.to_rfc3339(),
            });
        }
    }

    let count = subordinates.len();
    Ok(Json(ListSubordinatesResponse { subordinates, count }))
}

/// Unregister a subordinate
///
/// DELETE /v1/subordinates/{entity_id}
///
/// The entity identifier is percent-encoded in the path.
pub async fn unregister_subordinate(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<RegisterSubordinateResponse>, ApiError> {
    let entity_id = entity_id.trim_end_matches('/').to_string();
    if !state.store.unregister(&entity_id).await? {
        return Err(ApiError::NotFound(format!("Unknown subordinate '{}'", entity_id)));
    }

    info!(entity_id = %entity_id, "Unregistered subordinate");

    Ok(Json(RegisterSubordinateResponse {
        registered: false,
        entity_id,
        message: "Subordinate unregistered".to_string(),
    }))
}
