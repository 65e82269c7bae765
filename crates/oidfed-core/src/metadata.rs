//! Entity metadata model
//!
//! Metadata is keyed by entity type. Each entity type carries an attribute
//! bag, an ordered map from attribute name to JSON value, which the policy
//! engine reads and rewrites attribute by attribute.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Entity types defined by OpenID Federation and the OAuth/OIDC profiles
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityType {
    /// OpenID Connect provider
    OpenIdProvider,
    /// OpenID Connect relying party
    OpenIdRelyingParty,
    /// OAuth 2.0 authorization server
    OAuthAuthorizationServer,
    /// OAuth 2.0 client
    OAuthClient,
    /// OAuth 2.0 protected resource
    OAuthResource,
    /// Federation participant (every entity may publish this)
    FederationEntity,
    /// Extension entity type
    Other(String),
}

impl EntityType {
    /// Wire name of the entity type
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::OpenIdProvider => "openid_provider",
            EntityType::OpenIdRelyingParty => "openid_relying_party",
            EntityType::OAuthAuthorizationServer => "oauth_authorization_server",
            EntityType::OAuthClient => "oauth_client",
            EntityType::OAuthResource => "oauth_resource",
            EntityType::FederationEntity => "federation_entity",
            EntityType::Other(name) => name,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        match s {
            "openid_provider" => EntityType::OpenIdProvider,
            "openid_relying_party" => EntityType::OpenIdRelyingParty,
            "oauth_authorization_server" => EntityType::OAuthAuthorizationServer,
            "oauth_client" => EntityType::OAuthClient,
            "oauth_resource" => EntityType::OAuthResource,
            "federation_entity" => EntityType::FederationEntity,
            other => EntityType::Other(other.to_string()),
        }
    }
}

impl Serialize for EntityType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(EntityType::from(s.as_str()))
    }
}

/// Attribute bag for one entity type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityMetadata(Map<String, JsonValue>);

impl EntityMetadata {
    /// Create an empty attribute bag
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set an attribute (builder pattern)
    pub fn with(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Set an attribute
    pub fn insert(&mut self, name: impl Into<String>, value: JsonValue) {
        self.0.insert(name.into(), value);
    }

    /// Remove an attribute
    pub fn remove(&mut self, name: &str) -> Option<JsonValue> {
        self.0.remove(name)
    }

    /// Get an attribute
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    /// Get a string attribute
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }

    /// Check if an attribute is present
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterate over attributes in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    /// Attribute names in name order
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, JsonValue>> for EntityMetadata {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

/// Metadata of an entity, keyed by entity type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<EntityType, EntityMetadata>);

impl Metadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the attribute bag for an entity type (builder pattern)
    pub fn with(mut self, entity_type: EntityType, metadata: EntityMetadata) -> Self {
        self.0.insert(entity_type, metadata);
        self
    }

    /// Insert the attribute bag for an entity type
    pub fn insert(&mut self, entity_type: EntityType, metadata: EntityMetadata) {
        self.0.insert(entity_type, metadata);
    }

    /// Attribute bag for an entity type
    pub fn get(&self, entity_type: &EntityType) -> Option<&EntityMetadata> {
        self.0.get(entity_type)
    }

    /// Mutable attribute bag for an entity type
    pub fn get_mut(&mut self, entity_type: &EntityType) -> Option<&mut EntityMetadata> {
        self.0.get_mut(entity_type)
    }

    /// Entity types present in this metadata
    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.0.keys()
    }

    /// Iterate over entity types and their attribute bags
    pub fn iter(&self) -> impl Iterator<Item = (&EntityType, &EntityMetadata)> {
        self.0.iter()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `federation_entity` attribute bag
    pub fn federation_entity(&self) -> Option<&EntityMetadata> {
        self.0.get(&EntityType::FederationEntity)
    }

    /// The fetch endpoint an authority publishes for subordinate statements
    pub fn fetch_endpoint(&self) -> Option<&str> {
        self.federation_entity()
            .and_then(|m| m.get_str("federation_fetch_endpoint"))
    }

    /// The list endpoint an authority publishes for its subordinates
    pub fn list_endpoint(&self) -> Option<&str> {
        self.federation_entity()
            .and_then(|m| m.get_str("federation_list_endpoint"))
    }

    /// The resolve endpoint of an entity
    pub fn resolve_endpoint(&self) -> Option<&str> {
        self.federation_entity()
            .and_then(|m| m.get_str("federation_resolve_endpoint"))
    }

    /// Human-readable organization name
    pub fn organization_name(&self) -> Option<&str> {
        self.federation_entity()
            .and_then(|m| m.get_str("organization_name"))
    }

    /// Overlay attributes from `other` onto this metadata
    ///
    /// Attributes present in `other` replace the ones here; entity types
    /// that only exist in `other` are not introduced.
    pub fn override_with(&mut self, other: &Metadata) {
        for (entity_type, overrides) in &other.0 {
            if let Some(target) = self.0.get_mut(entity_type) {
                for (name, value) in overrides.iter() {
                    target.insert(name.clone(), value.clone());
                }
            }
        }
    }
}
