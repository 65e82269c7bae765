//! Trust Resolver
//!
//! Walks authority hints outward from a starting entity until every branch
//! reaches a configured trust anchor, fails, or runs out of hints. The walk
//! builds a resolution tree; a bottom-up pass then checks signatures from
//! the anchors down and enumerates every fully trusted path as a chain.
//!
//! Failures never abort a resolution. A branch whose statements cannot be
//! fetched, parsed or verified is dropped and its siblings carry on.

use chrono::Utc;
use oidfed_core::{
    EntityStatement, JwkSet, PolicyEngine, SortOrder, TrustAnchorFilter, TrustAnchors, TrustChain,
    TrustChains, ValidConstraintsFilter, ValidMetadataFilter,
};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ResolveError, Result};
use crate::providers::EntityStatementProvider;

/// Resolver settings
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Upper bound for each individual fetch
    pub fetch_timeout: Duration,
    /// Maximum number of authority hops above the starting entity
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            max_depth: 10,
        }
    }
}

/// A node of the resolution tree
///
/// `entity` is the configuration of the node's entity; `subordinate` is the
/// statement that entity issued about the node below (absent at the root).
#[derive(Debug)]
struct ResolutionNode {
    entity: EntityStatement,
    subordinate: Option<EntityStatement>,
    authorities: Vec<ResolutionNode>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves trust chains from a starting entity to a set of trust anchors
pub struct TrustResolver {
    provider: Arc<dyn EntityStatementProvider>,
    config: ResolverConfig,
    engine: PolicyEngine,
}

impl TrustResolver {
    /// Create a resolver with default settings
    pub fn new(provider: Arc<dyn EntityStatementProvider>) -> Self {
        Self {
            provider,
            config: ResolverConfig::default(),
            engine: PolicyEngine::standard(),
        }
    }

    /// Use the given settings
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Use the given policy engine when selecting chains
    pub fn with_policy_engine(mut self, engine: PolicyEngine) -> Self {
        self.engine = engine;
        self
    }

    /// The resolver settings
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The policy engine used when selecting chains
    pub fn policy_engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Find every verified chain from `starting_entity` to one of `anchors`
    ///
    /// Returns an empty collection when there are no anchors, when the
    /// starting entity cannot be fetched, or when no path verifies.
    pub async fn resolve_to_valid_chains(
        &self,
        starting_entity: &str,
        anchors: &TrustAnchors,
    ) -> TrustChains {
        if anchors.is_empty() {
            debug!(subject = %starting_entity, "No trust anchors configured");
            return TrustChains::new();
        }

        let start = match self.fetch_configuration(starting_entity).await {
            Ok(start) => start,
            Err(e) => {
                debug!(subject = %starting_entity, error = %e, "Starting entity unavailable");
                return TrustChains::new();
            }
        };

        if let Some(anchor) = anchors.get(starting_entity) {
            let verified = anchor_keys(&anchor.jwks, &start)
                .and_then(|keys| start.verify(keys).map_err(ResolveError::from));
            let mut chains = TrustChains::new();
            match verified {
                Ok(()) => chains.push(TrustChain::new(vec![start])),
                Err(e) => warn!(
                    anchor = %starting_entity,
                    error = %e,
                    "Trust anchor configuration failed verification"
                ),
            }
            return chains;
        }

        let path = vec![starting_entity.to_string()];
        let root = self.expand(start, None, anchors, path).await;

        let chains: TrustChains = self
            .paths_above(&root, anchors)
            .into_iter()
            .map(|rest| {
                let mut statements = Vec::with_capacity(rest.len() + 1);
                statements.push(root.entity.clone());
                statements.extend(rest);
                TrustChain::new(statements)
            })
            .collect();

        info!(
            subject = %starting_entity,
            anchors = anchors.len(),
            chains = chains.len(),
            "Resolved trust chains"
        );
        chains
    }

    /// Resolve and select the shortest chain to `anchor_id`
    ///
    /// Chains violating constraints or whose metadata cannot be resolved
    /// are discarded before selection.
    pub async fn resolve_best(
        &self,
        starting_entity: &str,
        anchors: &TrustAnchors,
        anchor_id: &str,
    ) -> Option<TrustChain> {
        let chains = self.resolve_to_valid_chains(starting_entity, anchors).await;
        let metadata_filter = ValidMetadataFilter::new(self.engine.clone());
        let anchor_filter = TrustAnchorFilter::new([anchor_id]);
        chains
            .filter(&[&anchor_filter, &ValidConstraintsFilter, &metadata_filter])
            .sort(SortOrder::Ascending)
            .into_iter()
            .next()
    }

    /// Build the resolution tree above `entity`
    fn expand<'a>(
        &'a self,
        entity: EntityStatement,
        subordinate: Option<EntityStatement>,
        anchors: &'a TrustAnchors,
        path: Vec<String>,
    ) -> BoxFuture<'a, ResolutionNode> {
        Box::pin(async move {
            let mut node = ResolutionNode {
                entity,
                subordinate,
                authorities: Vec::new(),
            };

            if anchors.contains(node.entity.issuer()) {
                return node;
            }
            if path.len() > self.config.max_depth {
                debug!(
                    entity = %node.entity.issuer(),
                    depth = path.len(),
                    "Maximum depth reached"
                );
                return node;
            }

            let hints: Vec<String> = {
                let mut seen = HashSet::new();
                node.entity
                    .authority_hints()
                    .iter()
                    .filter(|hint| seen.insert(hint.as_str()))
                    .cloned()
                    .collect()
            };

            let subject = node.entity.issuer().to_string();
            for authority_id in hints {
                if path.contains(&authority_id) {
                    debug!(authority = %authority_id, "Authority cycle detected, dropping branch");
                    continue;
                }

                match self.fetch_authority(&authority_id, &subject).await {
                    Ok((configuration, statement)) => {
                        let mut next_path = path.clone();
                        next_path.push(authority_id);
                        let child = self
                            .expand(configuration, Some(statement), anchors, next_path)
                            .await;
                        node.authorities.push(child);
                    }
                    Err(e) => {
                        debug!(
                            authority = %authority_id,
                            subject = %subject,
                            error = %e,
                            "Dropping authority hint"
                        );
                    }
                }
            }

            node
        })
    }

    /// Fetch an authority's configuration and its statement about `subject`
    async fn fetch_authority(
        &self,
        authority_id: &str,
        subject: &str,
    ) -> Result<(EntityStatement, EntityStatement)> {
        let configuration = self.fetch_configuration(authority_id).await?;
        let fetch_endpoint = configuration
            .fetch_endpoint()
            .ok_or_else(|| ResolveError::MissingFetchEndpoint(authority_id.to_string()))?
            .to_string();

        let statement = self
            .with_timeout(
                &fetch_endpoint,
                self.provider
                    .subordinate_statement(&fetch_endpoint, subject, authority_id),
            )
            .await?;

        if statement.issuer() != authority_id || statement.subject() != subject {
            return Err(ResolveError::UnexpectedStatement(format!(
                "expected {} about {}, got {} about {}",
                authority_id,
                subject,
                statement.issuer(),
                statement.subject()
            )));
        }
        statement.check_validity(Utc::now())?;

        Ok((configuration, statement))
    }

    /// Fetch an entity configuration and check it describes `entity_id` now
    async fn fetch_configuration(&self, entity_id: &str) -> Result<EntityStatement> {
        let configuration = self
            .with_timeout(entity_id, self.provider.entity_configuration(entity_id))
            .await?;

        if configuration.issuer() != entity_id || configuration.subject() != entity_id {
            return Err(ResolveError::UnexpectedStatement(format!(
                "configuration of {} issued by {} about {}",
                entity_id,
                configuration.issuer(),
                configuration.subject()
            )));
        }
        configuration.check_validity(Utc::now())?;

        Ok(configuration)
    }

    async fn with_timeout<T>(
        &self,
        target: &str,
        fetch: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.config.fetch_timeout, fetch)
            .await
            .map_err(|_| ResolveError::Timeout(target.to_string()))?
    }

    /// Trusted paths above `node`, each starting with a statement about it
    ///
    /// A child's paths count only if the node's own statements verify with
    /// the keys the child's superior attests for the node's entity.
    fn paths_above(
        &self,
        node: &ResolutionNode,
        anchors: &TrustAnchors,
    ) -> Vec<Vec<EntityStatement>> {
        let mut paths = Vec::new();
        for child in &node.authorities {
            let child_paths = self.node_paths(child, anchors);
            if child_paths.is_empty() {
                continue;
            }
            let Some(keys) = child.subordinate.as_ref().and_then(|s| s.jwks()) else {
                debug!(authority = %child.entity.issuer(), "Subordinate statement carries no jwks");
                continue;
            };
            if let Err(e) = verify_node(node, keys) {
                warn!(
                    entity = %node.entity.issuer(),
                    authority = %child.entity.issuer(),
                    error = %e,
                    "Signature verification failed"
                );
                continue;
            }
            paths.extend(child_paths);
        }
        paths
    }

    /// Trusted paths starting with `node.subordinate`
    fn node_paths(
        &self,
        node: &ResolutionNode,
        anchors: &TrustAnchors,
    ) -> Vec<Vec<EntityStatement>> {
        let Some(statement) = &node.subordinate else {
            return Vec::new();
        };

        if let Some(anchor) = anchors.get(statement.issuer()) {
            let verified = anchor_keys(&anchor.jwks, &node.entity)
                .and_then(|keys| verify_node(node, keys));
            return match verified {
                Ok(()) => vec![vec![statement.clone()]],
                Err(e) => {
                    warn!(
                        anchor = %anchor.entity_id,
                        error = %e,
                        "Trust anchor signature verification failed"
                    );
                    Vec::new()
                }
            };
        }

        self.paths_above(node, anchors)
            .into_iter()
            .map(|rest| {
                let mut path = Vec::with_capacity(rest.len() + 1);
                path.push(statement.clone());
                path.extend(rest);
                path
            })
            .collect()
    }
}

/// Keys to verify an anchor with: pinned keys, else its own published keys
fn anchor_keys<'a>(pinned: &'a JwkSet, configuration: &'a EntityStatement) -> Result<&'a JwkSet> {
    if !pinned.keys.is_empty() {
        return Ok(pinned);
    }
    configuration.jwks().ok_or_else(|| {
        ResolveError::UnexpectedStatement(format!(
            "trust anchor {} publishes no jwks",
            configuration.issuer()
        ))
    })
}

fn verify_node(node: &ResolutionNode, keys: &JwkSet) -> Result<()> {
    node.entity.verify(keys)?;
    if let Some(statement) = &node.subordinate {
        statement.verify(keys)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::InMemoryProvider;
    use chrono::Duration as ChronoDuration;
    use oidfed_core::{
        EntityMetadata, EntityStatementClaims, EntityType, KeyPair, Metadata, TrustAnchor,
    };
    use serde_json::json;

    const RP: &str = "https://rp.example.com";
    const TA: &str = "https://ta.example.com";

    fn federation_metadata(entity_id: &str) -> Metadata {
        Metadata::new().with(
            EntityType::FederationEntity,
            EntityMetadata::new()
                .with("federation_fetch_endpoint", json!(format!("{}/fetch", entity_id))),
        )
    }

    /// rp -> ta, both published in an in-memory provider
    fn two_level() -> (Arc<InMemoryProvider>, KeyPair, KeyPair) {
        let rp_key = KeyPair::generate("rp");
        let ta_key = KeyPair::generate("ta");
        let provider = Arc::new(InMemoryProvider::new());

        let rp = EntityStatementClaims::configuration(RP, ChronoDuration::hours(1))
            .with_jwks(rp_key.jwks().unwrap())
            .with_authority_hint(TA);
        let ta = EntityStatementClaims::configuration(TA, ChronoDuration::hours(1))
            .with_jwks(ta_key.jwks().unwrap())
            .with_metadata(federation_metadata(TA));
        let ta_about_rp = EntityStatementClaims::new(TA, RP, ChronoDuration::hours(1))
            .with_jwks(rp_key.jwks().unwrap());

        provider.add_configuration(RP, rp_key.sign_statement(&rp).unwrap());
        provider.add_configuration(TA, ta_key.sign_statement(&ta).unwrap());
        provider.add_subordinate(TA, RP, ta_key.sign_statement(&ta_about_rp).unwrap());

        (provider, rp_key, ta_key)
    }

    #[tokio::test]
    async fn test_resolves_direct_subordinate() {
        let (provider, _, ta_key) = two_level();
        let resolver = TrustResolver::new(provider);
        let anchors = TrustAnchors::new().with(TrustAnchor::new(TA, ta_key.jwks().unwrap()));

        let chains = resolver.resolve_to_valid_chains(RP, &anchors).await;

        assert_eq!(chains.len(), 1);
        let chain = chains.iter().next().unwrap();
        assert_eq!(chain.path_len(), 2);
        assert_eq!(chain.subject(), Some(RP));
        assert_eq!(chain.trust_anchor_id(), Some(TA));
    }

    #[tokio::test]
    async fn test_unpinned_anchor_uses_published_keys() {
        let (provider, _, _) = two_level();
        let resolver = TrustResolver::new(provider);
        let anchors = TrustAnchors::new().with(TrustAnchor::unpinned(TA));

        let chains = resolver.resolve_to_valid_chains(RP, &anchors).await;
        assert_eq!(chains.len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_anchor_keys_yield_nothing() {
        let (provider, _, _) = two_level();
        let resolver = TrustResolver::new(provider);
        let impostor = KeyPair::generate("ta");
        let anchors = TrustAnchors::new().with(TrustAnchor::new(TA, impostor.jwks().unwrap()));

        assert!(resolver.resolve_to_valid_chains(RP, &anchors).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_anchors_yield_nothing() {
        let (provider, _, _) = two_level();
        let resolver = TrustResolver::new(provider.clone());

        assert!(resolver
            .resolve_to_valid_chains(RP, &TrustAnchors::new())
            .await
            .is_empty());
        assert_eq!(provider.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_start_yields_nothing() {
        let (provider, _, ta_key) = two_level();
        let resolver = TrustResolver::new(provider);
        let anchors = TrustAnchors::new().with(TrustAnchor::new(TA, ta_key.jwks().unwrap()));

        assert!(resolver
            .resolve_to_valid_chains("https://nobody.example.com", &anchors)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_anchor_as_starting_entity() {
        let (provider, _, ta_key) = two_level();
        let resolver = TrustResolver::new(provider);
        let anchors = TrustAnchors::new().with(TrustAnchor::new(TA, ta_key.jwks().unwrap()));

        let chains = resolver.resolve_to_valid_chains(TA, &anchors).await;
        assert_eq!(chains.len(), 1);
        assert_eq!(chains.iter().next().unwrap().path_len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_best_filters_by_anchor() {
        let (provider, _, ta_key) = two_level();
        let resolver = TrustResolver::new(provider);
        let anchors = TrustAnchors::new().with(TrustAnchor::new(TA, ta_key.jwks().unwrap()));

        assert!(resolver.resolve_best(RP, &anchors, TA).await.is_some());
        assert!(resolver
            .resolve_best(RP, &anchors, "https://other-ta.example.com")
            .await
            .is_none());
    }
}
