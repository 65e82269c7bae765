//! Test helpers: an in-memory federation with real Ed25519 signatures

#![allow(dead_code)]

use chrono::{Duration, Utc};
use oidfed_core::{
    EntityMetadata, EntityStatementClaims, EntityType, KeyPair, Metadata, MetadataPolicies,
    TrustAnchor, TrustAnchors,
};
use oidfed_resolver::InMemoryProvider;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

struct EntityDef {
    key: KeyPair,
    hints: Vec<String>,
    metadata: Metadata,
    expired: bool,
}

/// Statement a superior issues about a subordinate
struct Link {
    superior: String,
    subordinate: String,
    policy: MetadataPolicies,
}

/// Builds a federation and publishes every statement in an in-memory provider
#[derive(Default)]
pub struct FederationBuilder {
    entities: BTreeMap<String, EntityDef>,
    links: Vec<Link>,
}

impl FederationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity with a fresh key
    pub fn entity(mut self, entity_id: &str) -> Self {
        self.entities.insert(
            entity_id.to_string(),
            EntityDef {
                key: KeyPair::generate(format!("{}#key", entity_id)),
                hints: Vec::new(),
                metadata: Metadata::new().with(
                    EntityType::FederationEntity,
                    EntityMetadata::new()
                        .with("federation_fetch_endpoint", json!(format!("{}/fetch", entity_id))),
                ),
                expired: false,
            },
        );
        self
    }

    /// Add a leaf relying party publishing the given contacts
    pub fn relying_party(mut self, entity_id: &str, contacts: &[&str]) -> Self {
        self = self.entity(entity_id);
        if let Some(def) = self.entities.get_mut(entity_id) {
            def.metadata.insert(
                EntityType::OpenIdRelyingParty,
                EntityMetadata::new()
                    .with("client_name", json!("Test RP"))
                    .with("contacts", json!(contacts)),
            );
        }
        self
    }

    /// `subordinate` names `superior` as an authority and `superior` vouches for it
    pub fn link(self, subordinate: &str, superior: &str) -> Self {
        self.link_with_policy(subordinate, superior, MetadataPolicies::new())
    }

    /// Like [`FederationBuilder::link`], with a metadata policy on the statement
    pub fn link_with_policy(
        mut self,
        subordinate: &str,
        superior: &str,
        policy: MetadataPolicies,
    ) -> Self {
        if let Some(def) = self.entities.get_mut(subordinate) {
            def.hints.push(superior.to_string());
        }
        self.links.push(Link {
            superior: superior.to_string(),
            subordinate: subordinate.to_string(),
            policy,
        });
        self
    }

    /// Add an authority hint without a matching subordinate statement
    pub fn dangling_hint(mut self, subordinate: &str, superior: &str) -> Self {
        if let Some(def) = self.entities.get_mut(subordinate) {
            def.hints.push(superior.to_string());
        }
        self
    }

    /// Publish an already expired configuration for `entity_id`
    pub fn expired(mut self, entity_id: &str) -> Self {
        if let Some(def) = self.entities.get_mut(entity_id) {
            def.expired = true;
        }
        self
    }

    pub fn build(self) -> Federation {
        let provider = Arc::new(InMemoryProvider::new());

        for (entity_id, def) in &self.entities {
            let mut claims =
                EntityStatementClaims::configuration(entity_id.as_str(), Duration::hours(1))
                    .with_jwks(def.key.jwks().unwrap())
                    .with_metadata(def.metadata.clone());
            if def.expired {
                let now = Utc::now();
                claims = claims.with_validity(now - Duration::hours(2), now - Duration::hours(1));
            }
            claims.authority_hints = def.hints.clone();
            provider.add_configuration(entity_id.as_str(), def.key.sign_statement(&claims).unwrap());
        }

        for link in &self.links {
            let (Some(superior), Some(subordinate)) = (
                self.entities.get(&link.superior),
                self.entities.get(&link.subordinate),
            ) else {
                continue;
            };
            let claims = EntityStatementClaims::new(
                link.superior.as_str(),
                link.subordinate.as_str(),
                Duration::hours(2),
            )
            .with_jwks(subordinate.key.jwks().unwrap())
            .with_metadata_policy(link.policy.clone())
            .with_source_endpoint(format!("{}/fetch", link.superior));
            provider.add_subordinate(
                link.superior.as_str(),
                link.subordinate.as_str(),
                superior.key.sign_statement(&claims).unwrap(),
            );
        }

        let keys = self
            .entities
            .into_iter()
            .map(|(id, def)| (id, def.key))
            .collect();
        Federation { provider, keys }
    }
}

pub struct Federation {
    pub provider: Arc<InMemoryProvider>,
    keys: BTreeMap<String, KeyPair>,
}

impl Federation {
    pub fn key(&self, entity_id: &str) -> &KeyPair {
        &self.keys[entity_id]
    }

    /// A trust anchor pinned to the entity's real key
    pub fn anchor(&self, entity_id: &str) -> TrustAnchor {
        TrustAnchor::new(entity_id, self.key(entity_id).jwks().unwrap())
    }

    pub fn anchors(&self, entity_ids: &[&str]) -> TrustAnchors {
        entity_ids.iter().map(|id| self.anchor(id)).collect()
    }
}
