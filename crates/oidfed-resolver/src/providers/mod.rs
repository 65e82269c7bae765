//! Entity statement providers
//!
//! A provider fetches entity configurations and subordinate statements on
//! behalf of the resolver. Statements come back parsed but unverified; the
//! resolver checks signatures once it knows which keys to trust.

pub mod http;
pub mod memory;

pub use http::{HttpProvider, HttpProviderConfig};
pub use memory::InMemoryProvider;

use async_trait::async_trait;
use oidfed_core::EntityStatement;

use crate::error::Result;

/// Well-known path of an entity configuration
pub const WELL_KNOWN_PATH: &str = "/.well-known/openid-federation";

/// Trait for entity statement sources
#[async_trait]
pub trait EntityStatementProvider: Send + Sync {
    /// Fetch the self-signed configuration of an entity
    async fn entity_configuration(&self, entity_id: &str) -> Result<EntityStatement>;

    /// Fetch the statement `issuer` makes about `subject` from its fetch endpoint
    ///
    /// # Arguments
    /// * `fetch_endpoint` - The issuer's `federation_fetch_endpoint`
    /// * `subject` - Entity the statement is about
    /// * `issuer` - Entity expected to have signed the statement
    async fn subordinate_statement(
        &self,
        fetch_endpoint: &str,
        subject: &str,
        issuer: &str,
    ) -> Result<EntityStatement>;

    /// Get a description of this provider (for logging)
    fn description(&self) -> &str {
        "entity statement provider"
    }
}

/// URL of an entity's configuration document
pub fn configuration_url(entity_id: &str) -> String {
    format!("{}{}", entity_id.trim_end_matches('/'), WELL_KNOWN_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_url() {
        assert_eq!(
            configuration_url("https://ta.example.com"),
            "https://ta.example.com/.well-known/openid-federation"
        );
        assert_eq!(
            configuration_url("https://ta.example.com/fed/"),
            "https://ta.example.com/fed/.well-known/openid-federation"
        );
    }
}
