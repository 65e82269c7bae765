//! API module for the federation entity server

pub mod auth;
pub mod error;
pub mod handlers;

use axum::{
    extract::State,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use oidfed_resolver::providers::WELL_KNOWN_PATH;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Health check response
#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub entity_id: String,
    pub kid: String,
    pub subordinate_count: usize,
    pub trust_anchor_count: usize,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Readiness check endpoint
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let count = state.store.count().await;

    Json(ReadyResponse {
        ready: count.is_ok(),
        entity_id: state.config.entity_id.clone(),
        kid: state.registry.kid(),
        subordinate_count: count.unwrap_or(0),
        trust_anchor_count: state.trust_anchors.len(),
    })
}

/// Create the API router
///
/// The `/v1` management endpoints are mounted only when an admin token is
/// configured, and every request to them must carry it as a bearer token.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Federation endpoints
        .route(WELL_KNOWN_PATH, get(handlers::entity_configuration))
        .route("/fetch", get(handlers::fetch_statement))
        .route("/list", get(handlers::list_subordinate_ids))
        .route("/resolve", get(handlers::resolve));

    if state.config.admin_token.is_some() {
        let management = Router::new()
            // Subordinate management endpoints
            .route(
                "/v1/subordinates",
                post(handlers::register_subordinate).get(handlers::list_subordinates),
            )
            .route(
                "/v1/subordinates/{entity_id}",
                delete(handlers::unregister_subordinate),
            )
            // Key management endpoints
            .route("/v1/keys/rotate", post(handlers::rotate_key))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_admin_token,
            ));
        router = router.merge(management);
    }

    router
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
