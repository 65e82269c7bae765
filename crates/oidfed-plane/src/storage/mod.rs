//! Storage abstraction for subordinate registrations
//!
//! A superior issues statements only about entities registered with it. The
//! registration carries everything the subordinate statement publishes: the
//! subordinate's keys, the metadata policy and constraints imposed on it.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oidfed_core::{Constraints, EntityType, JwkSet, MetadataPolicies};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Subordinate not found: {0}")]
    NotFound(String),

    #[error("Subordinate already registered: {0}")]
    AlreadyExists(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// A registered subordinate entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubordinateInfo {
    /// Entity identifier of the subordinate
    pub entity_id: String,
    /// Federation keys of the subordinate
    pub jwks: JwkSet,
    /// Entity types the subordinate operates as
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
    /// Policy placed on the subordinate's metadata
    #[serde(default)]
    pub metadata_policy: MetadataPolicies,
    /// Policy operators the subordinate must understand
    #[serde(default)]
    pub metadata_policy_crit: Vec<String>,
    /// Constraints on the chain below the subordinate
    #[serde(default)]
    pub constraints: Option<Constraints>,
    /// When this subordinate was registered
    pub registered_at: DateTime<Utc>,
}

impl SubordinateInfo {
    /// Registration with keys only
    pub fn new(entity_id: impl Into<String>, jwks: JwkSet) -> Self {
        Self {
            entity_id: entity_id.into(),
            jwks,
            entity_types: Vec::new(),
            metadata_policy: MetadataPolicies::new(),
            metadata_policy_crit: Vec::new(),
            constraints: None,
            registered_at: Utc::now(),
        }
    }

    /// Add an entity type
    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        if !self.entity_types.contains(&entity_type) {
            self.entity_types.push(entity_type);
        }
        self
    }

    /// Set the metadata policy
    pub fn with_metadata_policy(mut self, policy: MetadataPolicies) -> Self {
        self.metadata_policy = policy;
        self
    }

    /// Set constraints
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    /// Whether the subordinate operates as `entity_type`
    pub fn has_entity_type(&self, entity_type: &EntityType) -> bool {
        self.entity_types.contains(entity_type)
    }
}

/// Storage backend trait for subordinate registrations
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait SubordinateStore: Send + Sync + Debug {
    /// Register a subordinate, failing if it is already registered
    async fn register(&self, info: SubordinateInfo) -> Result<(), StorageError>;

    /// Register or replace a subordinate
    async fn upsert(&self, info: SubordinateInfo) -> Result<(), StorageError>;

    /// Get a subordinate by entity identifier
    async fn get(&self, entity_id: &str) -> Result<Option<SubordinateInfo>, StorageError>;

    /// Remove a subordinate
    async fn unregister(&self, entity_id: &str) -> Result<bool, StorageError>;

    /// List subordinate identifiers, optionally only those of one entity type
    async fn list(&self, entity_type: Option<&EntityType>) -> Result<Vec<String>, StorageError>;

    /// Number of registered subordinates
    async fn count(&self) -> Result<usize, StorageError>;
}
