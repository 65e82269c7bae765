//! Key Registry for the federation entity
//!
//! Holds the entity's federation signing key and the public halves of keys
//! it has rotated away from. Retired keys stay in the published JWK Set so
//! statements signed before a rotation keep verifying until they expire.

use oidfed_core::{FederationError, JwkSet, KeyPair, PublicKey};
use serde::Serialize;
use std::sync::RwLock;
use tracing::info;

/// Key Registry for the federation entity
///
/// Thread-safe storage for:
/// - The current signing key (this entity's federation identity)
/// - Retired public keys still published in `jwks`
pub struct KeyRegistry {
    /// Current signing key
    signing_key: RwLock<KeyPair>,

    /// Previously used public keys, newest first
    retired_keys: RwLock<Vec<PublicKey>>,
}

impl KeyRegistry {
    /// Create a new key registry with the given signing key
    pub fn new(signing_key: KeyPair) -> Self {
        info!(kid = %signing_key.kid(), "Key registry initialized with signing key");
        Self {
            signing_key: RwLock::new(signing_key),
            retired_keys: RwLock::new(Vec::new()),
        }
    }

    /// Generate a new key registry with a random signing key
    pub fn generate(kid: impl Into<String>) -> Self {
        Self::new(KeyPair::generate(kid))
    }

    /// Key ID of the current signing key
    pub fn kid(&self) -> String {
        self.signing_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .kid()
            .to_string()
    }

    /// Public half of the current signing key
    pub fn public_key(&self) -> PublicKey {
        self.signing_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .public_key()
    }

    /// Key IDs of retired keys, newest first
    pub fn retired_kids(&self) -> Vec<String> {
        self.retired_keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|k| k.kid().to_string())
            .collect()
    }

    /// The published key set: current key first, then retired keys
    pub fn jwks(&self) -> Result<JwkSet, FederationError> {
        let mut keys = vec![self.public_key().to_jwk()?];
        for retired in self.retired_keys.read().unwrap_or_else(|e| e.into_inner()).iter() {
            keys.push(retired.to_jwk()?);
        }
        Ok(JwkSet { keys })
    }

    // =========================================================================
    // Rotation
    // =========================================================================

    /// Replace the signing key, keeping the old public key published
    ///
    /// Returns the key ID of the retired key.
    pub fn rotate(&self, next: KeyPair) -> String {
        let mut current = self.signing_key.write().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *current, next);
        let retired_kid = previous.kid().to_string();

        self.retired_keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(0, previous.public_key());

        info!(retired = %retired_kid, kid = %current.kid(), "Rotated signing key");
        retired_kid
    }

    /// Stop publishing retired keys beyond the newest `keep`
    pub fn prune_retired(&self, keep: usize) -> usize {
        let mut retired = self.retired_keys.write().unwrap_or_else(|e| e.into_inner());
        let before = retired.len();
        retired.truncate(keep);
        before - retired.len()
    }

    // =========================================================================
    // Signing Operations
    // =========================================================================

    /// Sign an entity statement with the current key
    pub fn sign_statement<T: Serialize>(&self, claims: &T) -> Result<String, FederationError> {
        self.signing_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .sign_statement(claims)
    }

    /// Sign a payload of another JWS type with the current key
    pub fn sign_jws<T: Serialize>(&self, typ: &str, claims: &T) -> Result<String, FederationError> {
        self.signing_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .sign_jws(typ, claims)
    }
}
