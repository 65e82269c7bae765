//! In-memory storage backend
//!
//! Default storage implementation using an in-memory map.
//! Suitable for development and single-instance deployments.
//! Data is lost on restart.

use async_trait::async_trait;
use oidfed_core::EntityType;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::info;

use super::{StorageError, SubordinateInfo, SubordinateStore};

/// In-memory subordinate store
#[derive(Debug, Default)]
pub struct MemoryStore {
    subordinates: RwLock<BTreeMap<String, SubordinateInfo>>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubordinateStore for MemoryStore {
    async fn register(&self, info: SubordinateInfo) -> Result<(), StorageError> {
        let mut subordinates = self.subordinates.write().unwrap_or_else(|e| e.into_inner());
        if subordinates.contains_key(&info.entity_id) {
            return Err(StorageError::AlreadyExists(info.entity_id));
        }
        info!(entity_id = %info.entity_id, "Registering subordinate");
        subordinates.insert(info.entity_id.clone(), info);
        Ok(())
    }

    async fn upsert(&self, info: SubordinateInfo) -> Result<(), StorageError> {
        let mut subordinates = self.subordinates.write().unwrap_or_else(|e| e.into_inner());
        info!(entity_id = %info.entity_id, "Updating subordinate");
        subordinates.insert(info.entity_id.clone(), info);
        Ok(())
    }

    async fn get(&self, entity_id: &str) -> Result<Option<SubordinateInfo>, StorageError> {
        let subordinates = self.subordinates.read().unwrap_or_else(|e| e.into_inner());
        Ok(subordinates.get(entity_id).cloned())
    }

    async fn unregister(&self, entity_id: &str) -> Result<bool, StorageError> {
        let mut subordinates = self.subordinates.write().unwrap_or_else(|e| e.into_inner());
        let removed = subordinates.remove(entity_id).is_some();
        if removed {
            info!(entity_id = %entity_id, "Unregistered subordinate");
        }
        Ok(removed)
    }

    async fn list(&self, entity_type: Option<&EntityType>) -> Result<Vec<String>, StorageError> {
        let subordinates = self.subordinates.read().unwrap_or_else(|e| e.into_inner());
        Ok(subordinates
            .values()
            .filter(|s| entity_type.map_or(true, |t| s.has_entity_type(t)))
            .map(|s| s.entity_id.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self.subordinates.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oidfed_core::KeyPair;

    fn subordinate(entity_id: &str) -> SubordinateInfo {
        SubordinateInfo::new(entity_id, KeyPair::generate("k").jwks().unwrap())
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let store = MemoryStore::new();
        store.register(subordinate("https://rp.example.com")).await.unwrap();

        let found = store.get("https://rp.example.com").await.unwrap();
        assert!(found.is_some());
        assert!(store.get("https://op.example.com").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let store = MemoryStore::new();
        store.register(subordinate("https://rp.example.com")).await.unwrap();

        let result = store.register(subordinate("https://rp.example.com")).await;
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));

        store.upsert(subordinate("https://rp.example.com")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_by_entity_type() {
        let store = MemoryStore::new();
        store
            .register(subordinate("https://rp.example.com").with_entity_type(EntityType::OpenIdRelyingParty))
            .await
            .unwrap();
        store
            .register(subordinate("https://op.example.com").with_entity_type(EntityType::OpenIdProvider))
            .await
            .unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(
            store.list(Some(&EntityType::OpenIdProvider)).await.unwrap(),
            vec!["https://op.example.com"]
        );
    }

    #[tokio::test]
    async fn test_unregister() {
        let store = MemoryStore::new();
        store.register(subordinate("https://rp.example.com")).await.unwrap();

        assert!(store.unregister("https://rp.example.com").await.unwrap());
        assert!(!store.unregister("https://rp.example.com").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
