//! Common types used across the federation core

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FederationError, Result};
use crate::metadata::{EntityType, Metadata};

/// Constraints a superior places on the chain below its subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    /// Maximum number of intermediates between the subject and the leaf
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_path_length: Option<usize>,

    /// Entity identifier host restrictions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming_constraints: Option<NamingConstraints>,

    /// Entity types the leaf may publish metadata for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_entity_types: Option<Vec<EntityType>>,
}

impl Constraints {
    /// Create empty constraints
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum path length
    pub fn with_max_path_length(mut self, max: usize) -> Self {
        self.max_path_length = Some(max);
        self
    }

    /// Set naming constraints
    pub fn with_naming_constraints(mut self, naming: NamingConstraints) -> Self {
        self.naming_constraints = Some(naming);
        self
    }

    /// Set the allowed entity types
    pub fn with_allowed_entity_types(mut self, types: Vec<EntityType>) -> Self {
        self.allowed_entity_types = Some(types);
        self
    }

    /// Check the number of intermediates below the constrained subject
    pub fn check_path_length(&self, intermediates: usize) -> Result<()> {
        match self.max_path_length {
            Some(max) if intermediates > max => Err(FederationError::ConstraintViolation(
                format!("path length {} exceeds max_path_length {}", intermediates, max),
            )),
            _ => Ok(()),
        }
    }

    /// Check an entity identifier against the naming constraints
    pub fn check_entity_id(&self, entity_id: &str) -> Result<()> {
        match &self.naming_constraints {
            Some(naming) if !naming.permits(entity_id) => Err(
                FederationError::ConstraintViolation(format!(
                    "entity '{}' is outside the naming constraints",
                    entity_id
                )),
            ),
            _ => Ok(()),
        }
    }

    /// Check the leaf's metadata against the allowed entity types
    pub fn check_entity_types(&self, metadata: &Metadata) -> Result<()> {
        let Some(allowed) = &self.allowed_entity_types else {
            return Ok(());
        };
        for entity_type in metadata.entity_types() {
            if *entity_type != EntityType::FederationEntity && !allowed.contains(entity_type) {
                return Err(FederationError::ConstraintViolation(format!(
                    "entity type '{}' is not allowed",
                    entity_type
                )));
            }
        }
        Ok(())
    }
}

/// Host-based restrictions on entity identifiers
///
/// A name with a leading dot matches any subdomain of it; otherwise the
/// host must match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConstraints {
    /// Hosts an entity identifier must match one of (when non-empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permitted: Vec<String>,

    /// Hosts an entity identifier must not match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
}

impl NamingConstraints {
    /// Create empty naming constraints
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a permitted name
    pub fn permit(mut self, name: impl Into<String>) -> Self {
        self.permitted.push(name.into());
        self
    }

    /// Add an excluded name
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.excluded.push(name.into());
        self
    }

    /// Whether an entity identifier satisfies these constraints
    pub fn permits(&self, entity_id: &str) -> bool {
        let Some(host) = Url::parse(entity_id)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };

        if self.excluded.iter().any(|name| host_matches(&host, name)) {
            return false;
        }
        self.permitted.is_empty() || self.permitted.iter().any(|name| host_matches(&host, name))
    }
}

fn host_matches(host: &str, name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    if name.starts_with('.') {
        host.ends_with(&name)
    } else {
        host == name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EntityMetadata;
    use serde_json::json;

    #[test]
    fn test_max_path_length() {
        let constraints = Constraints::new().with_max_path_length(1);
        assert!(constraints.check_path_length(0).is_ok());
        assert!(constraints.check_path_length(1).is_ok());
        assert!(matches!(
            constraints.check_path_length(2),
            Err(FederationError::ConstraintViolation(_))
        ));
        assert!(Constraints::new().check_path_length(100).is_ok());
    }

    #[test]
    fn test_naming_constraints_subdomains() {
        let naming = NamingConstraints::new()
            .permit(".example.com")
            .exclude("bad.example.com");

        assert!(naming.permits("https://rp.example.com"));
        assert!(naming.permits("https://a.b.example.com/path"));
        assert!(!naming.permits("https://example.com"));
        assert!(!naming.permits("https://bad.example.com"));
        assert!(!naming.permits("https://rp.example.org"));
        assert!(!naming.permits("not a url"));
    }

    #[test]
    fn test_naming_constraints_exact_host() {
        let naming = NamingConstraints::new().permit("op.example.com");
        assert!(naming.permits("https://op.example.com"));
        assert!(!naming.permits("https://rp.op.example.com"));
    }

    #[test]
    fn test_allowed_entity_types_always_admit_federation_entity() {
        let constraints =
            Constraints::new().with_allowed_entity_types(vec![EntityType::OpenIdRelyingParty]);
        let rp = Metadata::new()
            .with(EntityType::FederationEntity, EntityMetadata::new())
            .with(
                EntityType::OpenIdRelyingParty,
                EntityMetadata::new().with("client_name", json!("rp")),
            );
        let op = Metadata::new().with(EntityType::OpenIdProvider, EntityMetadata::new());

        assert!(constraints.check_entity_types(&rp).is_ok());
        assert!(constraints.check_entity_types(&op).is_err());
    }

    #[test]
    fn test_constraints_deserialize() {
        let constraints: Constraints = serde_json::from_value(json!({
            "max_path_length": 2,
            "naming_constraints": {"permitted": [".example.com"]},
            "allowed_entity_types": ["openid_provider"]
        }))
        .unwrap();

        assert_eq!(constraints.max_path_length, Some(2));
        assert_eq!(
            constraints.allowed_entity_types,
            Some(vec![EntityType::OpenIdProvider])
        );
        assert!(constraints.check_entity_id("https://op.example.com").is_ok());
        assert!(constraints.check_entity_id("https://op.example.net").is_err());
    }
}
