//! Statement issuance
//!
//! Builds and signs the statements this entity publishes: its own entity
//! configuration and the subordinate statements served by the fetch
//! endpoint.

use oidfed_core::{
    EntityMetadata, EntityStatementClaims, EntityType, FederationError, Metadata,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::PlaneConfig;
use crate::keys::KeyRegistry;
use crate::storage::{StorageError, SubordinateStore};

/// Errors while issuing a statement
#[derive(Error, Debug)]
pub enum IssueError {
    #[error(transparent)]
    Federation(#[from] FederationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Signs the statements this entity publishes
pub struct StatementIssuer {
    config: PlaneConfig,
    registry: Arc<KeyRegistry>,
    store: Arc<dyn SubordinateStore>,
}

impl StatementIssuer {
    /// Create an issuer for the configured entity
    pub fn new(
        config: PlaneConfig,
        registry: Arc<KeyRegistry>,
        store: Arc<dyn SubordinateStore>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
        }
    }

    /// Entity identifier of this entity
    pub fn entity_id(&self) -> &str {
        &self.config.entity_id
    }

    /// Metadata published in the entity configuration
    pub fn metadata(&self) -> Metadata {
        let mut federation_entity = EntityMetadata::new()
            .with("federation_fetch_endpoint", json!(self.config.fetch_endpoint()))
            .with("federation_list_endpoint", json!(self.config.list_endpoint()))
            .with("federation_resolve_endpoint", json!(self.config.resolve_endpoint()));
        if let Some(name) = &self.config.organization_name {
            federation_entity.insert("organization_name", json!(name));
        }
        Metadata::new().with(EntityType::FederationEntity, federation_entity)
    }

    /// Sign the current entity configuration
    pub fn entity_configuration(&self) -> Result<String, IssueError> {
        let mut claims =
            EntityStatementClaims::configuration(self.entity_id(), self.config.statement_lifetime)
                .with_jwks(self.registry.jwks()?)
                .with_metadata(self.metadata());
        for hint in &self.config.authority_hints {
            claims = claims.with_authority_hint(hint.as_str());
        }
        Ok(self.registry.sign_statement(&claims)?)
    }

    /// Sign a statement about a registered subordinate
    ///
    /// Returns `None` when `subject` is not registered.
    pub async fn subordinate_statement(&self, subject: &str) -> Result<Option<String>, IssueError> {
        let Some(info) = self.store.get(subject).await? else {
            debug!(subject = %subject, "No such subordinate");
            return Ok(None);
        };

        let mut claims = EntityStatementClaims::new(
            self.entity_id(),
            info.entity_id.as_str(),
            self.config.statement_lifetime,
        )
        .with_jwks(info.jwks)
        .with_metadata_policy(info.metadata_policy)
        .with_source_endpoint(self.config.fetch_endpoint());
        for operator in info.metadata_policy_crit {
            claims = claims.with_critical_operator(operator);
        }
        if let Some(constraints) = info.constraints {
            claims = claims.with_constraints(constraints);
        }

        Ok(Some(self.registry.sign_statement(&claims)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SubordinateInfo};
    use oidfed_core::{
        Constraints, EntityStatement, KeyPair, MetadataPolicies, MetadataPolicy, MetadataPolicyEntry,
    };

    fn issuer() -> (StatementIssuer, Arc<MemoryStore>) {
        let mut config = PlaneConfig::new("https://ta.example.com");
        config.organization_name = Some("Example Federation".into());
        config.authority_hints = vec!["https://root.example.com".into()];
        let store = Arc::new(MemoryStore::new());
        let issuer = StatementIssuer::new(
            config,
            Arc::new(KeyRegistry::generate("ta")),
            store.clone(),
        );
        (issuer, store)
    }

    #[test]
    fn test_entity_configuration_is_self_signed() {
        let (issuer, _) = issuer();
        let statement = EntityStatement::parse(issuer.entity_configuration().unwrap()).unwrap();

        assert!(statement.is_self_signed());
        assert!(statement.verify_self_signed().is_ok());
        assert_eq!(statement.fetch_endpoint(), Some("https://ta.example.com/fetch"));
        assert_eq!(statement.authority_hints(), ["https://root.example.com"]);
        assert_eq!(
            statement.metadata().organization_name(),
            Some("Example Federation")
        );
    }

    #[tokio::test]
    async fn test_subordinate_statement_carries_registration() {
        let (issuer, store) = issuer();
        let rp_keys = KeyPair::generate("rp").jwks().unwrap();
        let policy = MetadataPolicies::new().with(
            EntityType::OpenIdRelyingParty,
            MetadataPolicy::new().with(
                "contacts",
                MetadataPolicyEntry::new().with("add", json!("ops@ta.example.com")),
            ),
        );
        let mut info = SubordinateInfo::new("https://rp.example.com", rp_keys.clone())
            .with_metadata_policy(policy.clone())
            .with_constraints(Constraints::new().with_max_path_length(0));
        info.metadata_policy_crit = vec!["add".into()];
        store.upsert(info).await.unwrap();

        let jws = issuer
            .subordinate_statement("https://rp.example.com")
            .await
            .unwrap()
            .unwrap();
        let statement = EntityStatement::parse(jws).unwrap();

        assert_eq!(statement.issuer(), "https://ta.example.com");
        assert_eq!(statement.subject(), "https://rp.example.com");
        assert_eq!(statement.jwks(), Some(&rp_keys));
        assert_eq!(statement.metadata_policy(), &policy);
        assert_eq!(statement.metadata_policy_crit(), ["add"]);
        assert_eq!(
            statement.constraints().and_then(|c| c.max_path_length),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_unknown_subordinate() {
        let (issuer, _) = issuer();
        assert!(issuer
            .subordinate_statement("https://nobody.example.com")
            .await
            .unwrap()
            .is_none());
    }
}
