//! Federation API Handlers
//!
//! The endpoints every federation entity publishes:
//! - Entity configuration at the well-known location
//! - Fetch endpoint for subordinate statements
//! - List endpoint for subordinate identifiers
//! - Resolve endpoint returning a signed resolution of a subject

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use oidfed_core::{EntityType, Metadata, RESOLVE_RESPONSE_TYP};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::AppState;
use crate::api::error::ApiError;

/// Media type of entity configurations and subordinate statements
pub const ENTITY_STATEMENT_CONTENT_TYPE: &str = "application/entity-statement+jwt";

/// Media type of resolve responses
pub const RESOLVE_RESPONSE_CONTENT_TYPE: &str = "application/resolve-response+jwt";

fn jwt_response(content_type: &'static str, jws: String) -> Response {
    ([(header::CONTENT_TYPE, content_type)], jws).into_response()
}

// =============================================================================
// Entity Configuration
// =============================================================================

/// GET /.well-known/openid-federation
///
/// Returns this entity's self-signed configuration.
pub async fn entity_configuration(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let jws = state.issuer.entity_configuration()?;
    Ok(jwt_response(ENTITY_STATEMENT_CONTENT_TYPE, jws))
}

// =============================================================================
// Fetch
// =============================================================================

/// Query of the fetch endpoint
#[derive(Debug, Deserialize)]
pub struct FetchParams {
    /// Subordinate the statement is about
    pub sub: Option<String>,
}

/// GET /fetch?sub=
///
/// Returns the statement this entity issues about a registered subordinate.
pub async fn fetch_statement(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FetchParams>,
) -> Result<Response, ApiError> {
    let subject = params
        .sub
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing 'sub' parameter".into()))?;

    let jws = state
        .issuer
        .subordinate_statement(&subject)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Unknown subordinate '{}'", subject)))?;

    Ok(jwt_response(ENTITY_STATEMENT_CONTENT_TYPE, jws))
}

// =============================================================================
// List
// =============================================================================

/// Query of the list endpoint
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Only list subordinates of this entity type
    pub entity_type: Option<String>,
}

/// GET /list
///
/// Lists the identifiers of registered subordinates.
pub async fn list_subordinate_ids(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let entity_type = params.entity_type.as_deref().map(EntityType::from);
    let ids = state.store.list(entity_type.as_ref()).await?;
    Ok(Json(ids))
}

// =============================================================================
// Resolve
// =============================================================================

/// Query of the resolve endpoint
#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    /// Entity to resolve
    pub sub: Option<String>,
    /// Trust anchor the chain must end at
    pub trust_anchor: Option<String>,
    /// Only include metadata of this entity type
    pub entity_type: Option<String>,
}

/// Payload of a resolve response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponseClaims {
    /// This entity
    pub iss: String,
    /// The resolved entity
    pub sub: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub iat: DateTime<Utc>,
    /// Expiry of the chain the resolution rests on
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
    /// Resolved metadata of the subject
    pub metadata: Metadata,
    /// The trust chain as compact JWS strings, subject first
    pub trust_chain: Vec<String>,
}

/// GET /resolve?sub=&trust_anchor=
///
/// Resolves the subject's trust chain to the given anchor and returns the
/// resulting metadata in a signed response.
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveParams>,
) -> Result<Response, ApiError> {
    let subject = params
        .sub
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing 'sub' parameter".into()))?;
    let anchor = params
        .trust_anchor
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing 'trust_anchor' parameter".into()))?;

    if !state.trust_anchors.contains(&anchor) {
        warn!(trust_anchor = %anchor, "Resolve request for unconfigured trust anchor");
        return Err(ApiError::UnknownTrustAnchor(anchor));
    }

    let chain = state
        .resolver
        .resolve_best(&subject, &state.trust_anchors, &anchor)
        .await
        .ok_or_else(|| ApiError::NoTrustChain(subject.clone()))?;

    let mut metadata = chain.metadata_with(state.resolver.policy_engine())?;
    if let Some(entity_type) = params.entity_type.as_deref().map(EntityType::from) {
        metadata = metadata
            .iter()
            .filter(|(t, _)| **t == entity_type)
            .fold(Metadata::new(), |acc, (t, m)| acc.with(t.clone(), m.clone()));
    }

    let exp = chain
        .expires_at()
        .ok_or_else(|| ApiError::NoTrustChain(subject.clone()))?;
    let claims = ResolveResponseClaims {
        iss: state.config.entity_id.clone(),
        sub: subject.clone(),
        iat: Utc::now(),
        exp,
        metadata,
        trust_chain: chain.to_jws_list(),
    };
    let jws = state.registry.sign_jws(RESOLVE_RESPONSE_TYP, &claims)?;

    info!(
        subject = %subject,
        trust_anchor = %anchor,
        path_len = chain.path_len(),
        "Resolved subject"
    );

    Ok(jwt_response(RESOLVE_RESPONSE_CONTENT_TYPE, jws))
}
