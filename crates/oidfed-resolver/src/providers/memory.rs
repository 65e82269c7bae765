//! In-memory Entity Statement Provider
//!
//! Serves pre-signed statements from maps. Useful for tests and for
//! deployments that receive statements out of band.

use async_trait::async_trait;
use oidfed_core::EntityStatement;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::EntityStatementProvider;
use crate::error::{ResolveError, Result};

/// Provider backed by in-memory statement maps
#[derive(Default)]
pub struct InMemoryProvider {
    /// Entity configurations by entity identifier
    configurations: RwLock<HashMap<String, String>>,
    /// Subordinate statements by (issuer, subject)
    subordinates: RwLock<HashMap<(String, String), String>>,
    /// Number of lookups served, hits and misses alike
    fetches: AtomicUsize,
}

impl InMemoryProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity configuration (compact JWS)
    pub fn add_configuration(&self, entity_id: impl Into<String>, jws: impl Into<String>) {
        self.configurations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entity_id.into(), jws.into());
    }

    /// Add a subordinate statement (compact JWS)
    pub fn add_subordinate(
        &self,
        issuer: impl Into<String>,
        subject: impl Into<String>,
        jws: impl Into<String>,
    ) {
        self.subordinates
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((issuer.into(), subject.into()), jws.into());
    }

    /// Remove an entity configuration
    pub fn remove_configuration(&self, entity_id: &str) {
        self.configurations
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(entity_id);
    }

    /// Number of lookups served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EntityStatementProvider for InMemoryProvider {
    async fn entity_configuration(&self, entity_id: &str) -> Result<EntityStatement> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let jws = self
            .configurations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(entity_id)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(entity_id.to_string()))?;
        Ok(EntityStatement::parse(jws)?)
    }

    async fn subordinate_statement(
        &self,
        _fetch_endpoint: &str,
        subject: &str,
        issuer: &str,
    ) -> Result<EntityStatement> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let jws = self
            .subordinates
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(issuer.to_string(), subject.to_string()))
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(format!("{} about {}", issuer, subject)))?;
        Ok(EntityStatement::parse(jws)?)
    }

    fn description(&self) -> &str {
        "in-memory entity statement provider"
    }
}
