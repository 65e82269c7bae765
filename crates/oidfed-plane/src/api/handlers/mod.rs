//! API request handlers

pub mod federation;
pub mod keys;
pub mod subordinates;

use oidfed_core::TrustAnchors;
use oidfed_resolver::{EntityStatementProvider, ResolverConfig, TrustResolver};
use std::sync::Arc;

use crate::config::PlaneConfig;
use crate::issuer::StatementIssuer;
use crate::keys::KeyRegistry;
use crate::provider::LocalProvider;
use crate::storage::SubordinateStore;

pub use federation::{
    entity_configuration, fetch_statement, list_subordinate_ids, resolve, FetchParams, ListParams,
    ResolveParams, ResolveResponseClaims, ENTITY_STATEMENT_CONTENT_TYPE,
    RESOLVE_RESPONSE_CONTENT_TYPE,
};
pub use keys::{rotate_key, RotateKeyRequest, RotateKeyResponse};
pub use subordinates::{
    list_subordinates, register_subordinate, unregister_subordinate, ListSubordinatesResponse,
    RegisterSubordinateRequest, RegisterSubordinateResponse, SubordinateEntry,
};

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: PlaneConfig,
    /// Signing keys of this entity
    pub registry: Arc<KeyRegistry>,
    /// Registered subordinates
    pub store: Arc<dyn SubordinateStore>,
    /// Signs the statements this entity publishes
    pub issuer: Arc<StatementIssuer>,
    /// Resolver behind the resolve endpoint
    pub resolver: TrustResolver,
    /// Trust anchors the resolve endpoint accepts
    pub trust_anchors: TrustAnchors,
}

impl AppState {
    /// Wire the state together
    ///
    /// `upstream` serves every statement not issued by this entity; in
    /// production it is an `HttpProvider`.
    pub fn new(
        config: PlaneConfig,
        registry: Arc<KeyRegistry>,
        store: Arc<dyn SubordinateStore>,
        upstream: Arc<dyn EntityStatementProvider>,
    ) -> Self {
        let issuer = Arc::new(StatementIssuer::new(
            config.clone(),
            registry.clone(),
            store.clone(),
        ));
        let resolver = TrustResolver::new(Arc::new(LocalProvider::new(issuer.clone(), upstream)))
            .with_config(ResolverConfig {
                fetch_timeout: config.fetch_timeout,
                ..ResolverConfig::default()
            });
        let trust_anchors = config.trust_anchor_set();

        Self {
            config,
            registry,
            store,
            issuer,
            resolver,
            trust_anchors,
        }
    }
}
