//! Statement provider for the resolve endpoint
//!
//! Serves this entity's own statements straight from the issuer and passes
//! every other lookup to an upstream provider, so resolving through this
//! entity never loops back over HTTP.

use async_trait::async_trait;
use oidfed_core::EntityStatement;
use oidfed_resolver::{EntityStatementProvider, ResolveError, Result};
use std::sync::Arc;

use crate::issuer::{IssueError, StatementIssuer};

/// Provider answering for the local entity first
pub struct LocalProvider {
    issuer: Arc<StatementIssuer>,
    upstream: Arc<dyn EntityStatementProvider>,
}

impl LocalProvider {
    /// Create a provider that falls back to `upstream`
    pub fn new(issuer: Arc<StatementIssuer>, upstream: Arc<dyn EntityStatementProvider>) -> Self {
        Self { issuer, upstream }
    }
}

impl From<IssueError> for ResolveError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Federation(e) => ResolveError::Federation(e),
            IssueError::Storage(e) => ResolveError::NotFound(e.to_string()),
        }
    }
}

#[async_trait]
impl EntityStatementProvider for LocalProvider {
    async fn entity_configuration(&self, entity_id: &str) -> Result<EntityStatement> {
        if entity_id == self.issuer.entity_id() {
            return Ok(EntityStatement::parse(self.issuer.entity_configuration()?)?);
        }
        self.upstream.entity_configuration(entity_id).await
    }

    async fn subordinate_statement(
        &self,
        fetch_endpoint: &str,
        subject: &str,
        issuer: &str,
    ) -> Result<EntityStatement> {
        if issuer == self.issuer.entity_id() {
            let jws = self
                .issuer
                .subordinate_statement(subject)
                .await?
                .ok_or_else(|| ResolveError::NotFound(format!("{} about {}", issuer, subject)))?;
            return Ok(EntityStatement::parse(jws)?);
        }
        self.upstream
            .subordinate_statement(fetch_endpoint, subject, issuer)
            .await
    }

    fn description(&self) -> &str {
        "local entity statement provider"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaneConfig;
    use crate::keys::KeyRegistry;
    use crate::storage::{MemoryStore, SubordinateInfo, SubordinateStore};
    use oidfed_core::KeyPair;
    use oidfed_resolver::InMemoryProvider;

    #[tokio::test]
    async fn test_serves_local_statements_and_delegates_the_rest() {
        let store = Arc::new(MemoryStore::new());
        store
            .register(SubordinateInfo::new(
                "https://rp.example.com",
                KeyPair::generate("rp").jwks().unwrap(),
            ))
            .await
            .unwrap();
        let issuer = Arc::new(StatementIssuer::new(
            PlaneConfig::new("https://ta.example.com"),
            Arc::new(KeyRegistry::generate("ta")),
            store,
        ));
        let upstream = Arc::new(InMemoryProvider::new());
        let provider = LocalProvider::new(issuer, upstream.clone());

        let own = provider
            .entity_configuration("https://ta.example.com")
            .await
            .unwrap();
        assert!(own.verify_self_signed().is_ok());

        let about_rp = provider
            .subordinate_statement(
                "https://ta.example.com/fetch",
                "https://rp.example.com",
                "https://ta.example.com",
            )
            .await
            .unwrap();
        assert_eq!(about_rp.subject(), "https://rp.example.com");
        assert_eq!(upstream.fetch_count(), 0);

        let remote = provider.entity_configuration("https://rp.example.com").await;
        assert!(matches!(remote, Err(ResolveError::NotFound(_))));
        assert_eq!(upstream.fetch_count(), 1);
    }
}
