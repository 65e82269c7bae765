//! API tests for the federation entity server
//!
//! These tests exercise the handlers against an in-memory federation:
//! - Entity configuration and fetch endpoint statements
//! - Subordinate registration and listing
//! - Resolve responses with policy-applied metadata
//! - Serving the router over a real socket

use axum::{
    body::to_bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Duration;
use oidfed_core::{
    crypto::verify_jws, EntityMetadata, EntityStatement, EntityStatementClaims, EntityType,
    KeyPair, Metadata,
};
use oidfed_plane::api::error::ApiError;
use oidfed_plane::api::handlers::{
    entity_configuration, fetch_statement, list_subordinate_ids, list_subordinates,
    register_subordinate, resolve, rotate_key, unregister_subordinate, FetchParams, ListParams,
    RegisterSubordinateRequest, ResolveParams, ResolveResponseClaims, RotateKeyRequest,
    ENTITY_STATEMENT_CONTENT_TYPE,
};
use oidfed_plane::{
    create_router, AdminToken, AppState, KeyRegistry, MemoryStore, PlaneConfig,
};
use oidfed_resolver::{EntityStatementProvider, HttpProvider, InMemoryProvider};
use serde_json::json;
use std::sync::Arc;

const TA: &str = "https://ta.example.com";
const RP: &str = "https://rp.example.com";

// =============================================================================
// Test Helpers
// =============================================================================

struct Fixture {
    state: Arc<AppState>,
    upstream: Arc<InMemoryProvider>,
    rp_key: KeyPair,
}

const ADMIN_TOKEN: &str = "test-admin-token";

/// A trust anchor server with an RP publishing its configuration upstream
fn fixture() -> Fixture {
    fixture_with(KeyRegistry::generate("ta-1"), |_| {})
}

fn fixture_with(registry: KeyRegistry, configure: impl FnOnce(&mut PlaneConfig)) -> Fixture {
    let mut config = PlaneConfig::new(TA);
    config.trust_anchors = vec![TA.to_string()];
    config.organization_name = Some("Example Federation".into());
    configure(&mut config);

    let rp_key = KeyPair::generate("rp-1");
    let rp_config = EntityStatementClaims::configuration(RP, Duration::hours(1))
        .with_jwks(rp_key.jwks().unwrap())
        .with_authority_hint(TA)
        .with_metadata(
            Metadata::new().with(
                EntityType::OpenIdRelyingParty,
                EntityMetadata::new()
                    .with("client_name", json!("Example RP"))
                    .with("contacts", json!(["rp@example.com"])),
            ),
        );
    let upstream = Arc::new(InMemoryProvider::new());
    upstream.add_configuration(RP, rp_key.sign_statement(&rp_config).unwrap());

    let state = Arc::new(AppState::new(
        config,
        Arc::new(registry),
        Arc::new(MemoryStore::new()),
        upstream.clone(),
    ));
    Fixture {
        state,
        upstream,
        rp_key,
    }
}

fn registration(value: serde_json::Value) -> Json<RegisterSubordinateRequest> {
    Json(serde_json::from_value(value).unwrap())
}

async fn register_rp(fixture: &Fixture) {
    register_subordinate(
        State(fixture.state.clone()),
        registration(json!({
            "entity_id": RP,
            "jwks": fixture.rp_key.jwks().unwrap(),
            "entity_types": ["openid_relying_party"],
            "metadata_policy": {
                "openid_relying_party": {
                    "contacts": { "add": "ops@ta.example.com" }
                }
            }
        })),
    )
    .await
    .unwrap();
}

/// Serve the router on an ephemeral port and return its base URL
async fn serve(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn resolve_params(sub: &str, trust_anchor: &str) -> Query<ResolveParams> {
    Query(ResolveParams {
        sub: Some(sub.to_string()),
        trust_anchor: Some(trust_anchor.to_string()),
        entity_type: None,
    })
}

// =============================================================================
// Entity Configuration and Fetch
// =============================================================================

#[tokio::test]
async fn test_entity_configuration_endpoint() {
    let fixture = fixture();
    let response = entity_configuration(State(fixture.state.clone()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        ENTITY_STATEMENT_CONTENT_TYPE
    );

    let statement = EntityStatement::parse(body_text(response).await).unwrap();
    assert!(statement.verify_self_signed().is_ok());
    assert_eq!(statement.issuer(), TA);
    assert_eq!(statement.fetch_endpoint(), Some("https://ta.example.com/fetch"));
    assert_eq!(
        statement.metadata().resolve_endpoint(),
        Some("https://ta.example.com/resolve")
    );
}

#[tokio::test]
async fn test_fetch_registered_subordinate() {
    let fixture = fixture();
    register_rp(&fixture).await;

    let response = fetch_statement(
        State(fixture.state.clone()),
        Query(FetchParams {
            sub: Some(RP.to_string()),
        }),
    )
    .await
    .unwrap();
    let statement = EntityStatement::parse(body_text(response).await).unwrap();

    assert_eq!(statement.issuer(), TA);
    assert_eq!(statement.subject(), RP);
    assert!(statement
        .verify(&fixture.state.registry.jwks().unwrap())
        .is_ok());
    assert!(!statement.metadata_policy().is_empty());
}

#[tokio::test]
async fn test_fetch_errors() {
    let fixture = fixture();

    let missing = fetch_statement(State(fixture.state.clone()), Query(FetchParams { sub: None }))
        .await
        .err()
        .unwrap();
    assert!(matches!(missing, ApiError::BadRequest(_)));

    let unknown = fetch_statement(
        State(fixture.state.clone()),
        Query(FetchParams {
            sub: Some("https://nobody.example.com".into()),
        }),
    )
    .await
    .err()
    .unwrap();
    assert_eq!(unknown.into_response().status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Subordinate Management
// =============================================================================

#[tokio::test]
async fn test_register_list_unregister() {
    let fixture = fixture();
    register_rp(&fixture).await;

    let ids = list_subordinate_ids(
        State(fixture.state.clone()),
        Query(ListParams { entity_type: None }),
    )
    .await
    .unwrap();
    assert_eq!(ids.0, vec![RP]);

    let providers = list_subordinate_ids(
        State(fixture.state.clone()),
        Query(ListParams {
            entity_type: Some("openid_provider".into()),
        }),
    )
    .await
    .unwrap();
    assert!(providers.0.is_empty());

    let listed = list_subordinates(State(fixture.state.clone())).await.unwrap();
    assert_eq!(listed.0.count, 1);
    assert_eq!(
        listed.0.subordinates[0].entity_types,
        vec![EntityType::OpenIdRelyingParty]
    );

    let removed = unregister_subordinate(State(fixture.state.clone()), Path(RP.to_string()))
        .await
        .unwrap();
    assert!(!removed.0.registered);

    let again = unregister_subordinate(State(fixture.state.clone()), Path(RP.to_string()))
        .await
        .err()
        .unwrap();
    assert!(matches!(again, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let fixture = fixture();
    register_rp(&fixture).await;

    let err = register_subordinate(
        State(fixture.state.clone()),
        registration(json!({ "entity_id": RP, "jwks": fixture.rp_key.jwks().unwrap() })),
    )
    .await
    .err()
    .unwrap();
    assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_registration_validation() {
    let fixture = fixture();
    let jwks = fixture.rp_key.jwks().unwrap();

    let not_a_url = register_subordinate(
        State(fixture.state.clone()),
        registration(json!({ "entity_id": "rp", "jwks": jwks })),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(not_a_url, ApiError::BadRequest(_)));

    let itself = register_subordinate(
        State(fixture.state.clone()),
        registration(json!({ "entity_id": TA, "jwks": jwks })),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(itself, ApiError::BadRequest(_)));

    let no_keys = register_subordinate(
        State(fixture.state.clone()),
        registration(json!({ "entity_id": RP, "jwks": { "keys": [] } })),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(no_keys, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn test_inconsistent_policy_rejected() {
    let fixture = fixture();

    let err = register_subordinate(
        State(fixture.state.clone()),
        registration(json!({
            "entity_id": RP,
            "jwks": fixture.rp_key.jwks().unwrap(),
            "metadata_policy": {
                "openid_relying_party": {
                    "grant_types": {
                        "subset_of": ["authorization_code"],
                        "superset_of": ["refresh_token"]
                    }
                }
            }
        })),
    )
    .await
    .err()
    .unwrap();
    assert_eq!(
        err.into_response().status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );

    let unknown_crit = register_subordinate(
        State(fixture.state.clone()),
        registration(json!({
            "entity_id": RP,
            "jwks": fixture.rp_key.jwks().unwrap(),
            "metadata_policy_crit": ["regexp"]
        })),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(unknown_crit, ApiError::Policy(_)));
}

// =============================================================================
// Resolve
// =============================================================================

#[tokio::test]
async fn test_resolve_applies_policy_and_signs_response() {
    let fixture = fixture();
    register_rp(&fixture).await;

    let response = resolve(State(fixture.state.clone()), resolve_params(RP, TA))
        .await
        .unwrap();
    let jws = body_text(response).await;
    let claims: ResolveResponseClaims =
        verify_jws(&jws, &fixture.state.registry.jwks().unwrap()).unwrap();

    assert_eq!(claims.iss, TA);
    assert_eq!(claims.sub, RP);
    assert_eq!(claims.trust_chain.len(), 2);
    // signed by the same key, but never usable as an entity statement
    assert!(EntityStatement::parse(jws.as_str()).is_err());

    let rp = claims.metadata.get(&EntityType::OpenIdRelyingParty).unwrap();
    assert_eq!(
        rp.get("contacts"),
        Some(&json!(["rp@example.com", "ops@ta.example.com"]))
    );

    let chain_exp = claims
        .trust_chain
        .iter()
        .map(|jws| EntityStatement::parse(jws.as_str()).unwrap().expires_at())
        .min()
        .unwrap();
    assert_eq!(claims.exp, chain_exp);
}

#[tokio::test]
async fn test_resolve_filters_entity_type() {
    let fixture = fixture();
    register_rp(&fixture).await;

    let response = resolve(
        State(fixture.state.clone()),
        Query(ResolveParams {
            sub: Some(RP.to_string()),
            trust_anchor: Some(TA.to_string()),
            entity_type: Some("openid_provider".into()),
        }),
    )
    .await
    .unwrap();
    let claims: ResolveResponseClaims = verify_jws(
        &body_text(response).await,
        &fixture.state.registry.jwks().unwrap(),
    )
    .unwrap();
    assert!(claims.metadata.is_empty());
}

#[tokio::test]
async fn test_resolve_errors() {
    let fixture = fixture();

    let unknown_anchor = resolve(
        State(fixture.state.clone()),
        resolve_params(RP, "https://other-ta.example.com"),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(unknown_anchor, ApiError::UnknownTrustAnchor(_)));

    // RP is not registered, so the anchor issues nothing about it
    let no_chain = resolve(State(fixture.state.clone()), resolve_params(RP, TA))
        .await
        .err()
        .unwrap();
    assert!(matches!(no_chain, ApiError::NoTrustChain(_)));

    let missing = resolve(
        State(fixture.state.clone()),
        Query(ResolveParams {
            sub: None,
            trust_anchor: Some(TA.to_string()),
            entity_type: None,
        }),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(missing, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn test_resolve_uses_local_statements() {
    let fixture = fixture();
    register_rp(&fixture).await;

    resolve(State(fixture.state.clone()), resolve_params(RP, TA))
        .await
        .unwrap();

    // Only the RP configuration comes from upstream
    assert_eq!(fixture.upstream.fetch_count(), 1);
}

#[tokio::test]
async fn test_resolve_with_pinned_trust_anchor() {
    let registry = KeyRegistry::generate("ta-1");
    let pinned = registry.jwks().unwrap();
    let fixture = fixture_with(registry, |config| {
        config.trust_anchor_jwks.insert(TA.to_string(), pinned);
    });
    register_rp(&fixture).await;

    assert!(fixture.state.trust_anchors.get(TA).unwrap().is_pinned());
    assert!(resolve(State(fixture.state.clone()), resolve_params(RP, TA))
        .await
        .is_ok());

    let impostor = KeyPair::generate("ta-1").jwks().unwrap();
    let fixture = fixture_with(KeyRegistry::generate("ta-1"), |config| {
        config.trust_anchor_jwks.insert(TA.to_string(), impostor);
    });
    register_rp(&fixture).await;

    let err = resolve(State(fixture.state.clone()), resolve_params(RP, TA))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ApiError::NoTrustChain(_)));
}

// =============================================================================
// Key Rotation
// =============================================================================

#[tokio::test]
async fn test_rotation_keeps_chains_resolvable() {
    let fixture = fixture();
    register_rp(&fixture).await;

    let before = body_text(
        entity_configuration(State(fixture.state.clone()))
            .await
            .unwrap(),
    )
    .await;

    let rotated = rotate_key(
        State(fixture.state.clone()),
        Json(RotateKeyRequest {
            kid: Some("ta-2".into()),
            keep_retired: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(rotated.0.kid, "ta-2");
    assert_eq!(rotated.0.retired, "ta-1");

    let jwks = fixture.state.registry.jwks().unwrap();
    assert!(EntityStatement::parse(before).unwrap().verify(&jwks).is_ok());
    assert!(resolve(State(fixture.state.clone()), resolve_params(RP, TA))
        .await
        .is_ok());

    let reused = rotate_key(
        State(fixture.state.clone()),
        Json(RotateKeyRequest {
            kid: Some("ta-1".into()),
            keep_retired: None,
        }),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(reused, ApiError::Conflict(_)));
}

// =============================================================================
// Router over HTTP
// =============================================================================

#[tokio::test]
async fn test_router_serves_federation_endpoints() {
    let fixture = fixture();
    register_rp(&fixture).await;

    let base = serve(fixture.state.clone()).await;

    let http = HttpProvider::new().unwrap();
    let configuration = http.entity_configuration(&base).await.unwrap();
    assert_eq!(configuration.issuer(), TA);
    assert!(configuration.verify_self_signed().is_ok());

    let about_rp = http
        .subordinate_statement(&format!("{}/fetch", base), RP, TA)
        .await
        .unwrap();
    assert_eq!(about_rp.subject(), RP);
}

#[tokio::test]
async fn test_management_requires_admin_token() {
    let fixture = fixture_with(KeyRegistry::generate("ta-1"), |config| {
        config.admin_token = Some(AdminToken::new(ADMIN_TOKEN));
    });
    let base = serve(fixture.state.clone()).await;
    let client = reqwest::Client::new();
    let body = json!({
        "entity_id": RP,
        "jwks": fixture.rp_key.jwks().unwrap(),
    })
    .to_string();
    let register = |token: Option<&str>| {
        let mut request = client
            .post(format!("{}/v1/subordinates", base))
            .header("content-type", "application/json")
            .body(body.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send()
    };

    let missing = register(None).await.unwrap();
    assert_eq!(missing.status().as_u16(), 401);
    let error: serde_json::Value = serde_json::from_str(&missing.text().await.unwrap()).unwrap();
    assert_eq!(error["code"], "UNAUTHORIZED");

    assert_eq!(register(Some("wrong")).await.unwrap().status().as_u16(), 401);
    assert_eq!(fixture.state.store.count().await.unwrap(), 0);

    let rotate = client
        .post(format!("{}/v1/keys/rotate", base))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(rotate.status().as_u16(), 401);
    assert_eq!(fixture.state.registry.kid(), "ta-1");

    let delete = client
        .delete(format!("{}/v1/subordinates/x", base))
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status().as_u16(), 401);

    assert_eq!(register(Some(ADMIN_TOKEN)).await.unwrap().status().as_u16(), 200);
    assert_eq!(fixture.state.store.count().await.unwrap(), 1);

    // federation endpoints stay public
    let list = client.get(format!("{}/list", base)).send().await.unwrap();
    assert_eq!(list.status().as_u16(), 200);
}

#[tokio::test]
async fn test_management_routes_absent_without_admin_token() {
    let fixture = fixture();
    let base = serve(fixture.state.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/v1/keys/rotate", base))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(fixture.state.registry.kid(), "ta-1");
}
