//! Server configuration from environment variables

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use oidfed_core::{JwkSet, KeyPair, TrustAnchor, TrustAnchors};
use std::collections::BTreeMap;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::Level;

/// Longest statement lifetime accepted (ten years)
pub const MAX_STATEMENT_LIFETIME_SECS: i64 = 10 * 365 * 86400;

/// Bearer token guarding the management endpoints
#[derive(Clone)]
pub struct AdminToken(String);

impl AdminToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Compare a presented token in constant time
    pub fn matches(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken([redacted])")
    }
}

/// Configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration of a federation entity server
#[derive(Debug, Clone)]
pub struct PlaneConfig {
    /// Entity identifier of this server (`OIDFED_ENTITY_ID`)
    pub entity_id: String,
    /// Listen port (`OIDFED_PORT`)
    pub port: u16,
    /// Signing key identifier (`OIDFED_KEY_ID`)
    pub key_id: String,
    /// Superiors published in the entity configuration (`OIDFED_AUTHORITY_HINTS`)
    pub authority_hints: Vec<String>,
    /// Trust anchors the resolve endpoint accepts (`OIDFED_TRUST_ANCHORS`)
    pub trust_anchors: Vec<String>,
    /// Published `organization_name` (`OIDFED_ORGANIZATION_NAME`)
    pub organization_name: Option<String>,
    /// Lifetime of every statement this server signs (`OIDFED_STATEMENT_LIFETIME_SECS`)
    pub statement_lifetime: chrono::Duration,
    /// Per-fetch timeout when resolving (`OIDFED_FETCH_TIMEOUT_MS`)
    pub fetch_timeout: Duration,
    /// Log level (`OIDFED_LOG_LEVEL`)
    pub log_level: Level,
    /// Persistent signing key (`OIDFED_SIGNING_KEY`, 32 base64url bytes)
    pub signing_key: Option<KeyPair>,
    /// Token for the `/v1` management endpoints (`OIDFED_ADMIN_TOKEN`)
    pub admin_token: Option<AdminToken>,
    /// Pinned keys per trust anchor (`OIDFED_TRUST_ANCHOR_JWKS`, JSON object)
    pub trust_anchor_jwks: BTreeMap<String, JwkSet>,
}

impl PlaneConfig {
    /// Configuration with defaults for everything but the entity identifier
    pub fn new(entity_id: impl Into<String>) -> Self {
        let entity_id = entity_id.into().trim_end_matches('/').to_string();
        Self {
            key_id: format!("oidfed-{}", uuid::Uuid::new_v4()),
            entity_id,
            port: 8080,
            authority_hints: Vec::new(),
            trust_anchors: Vec::new(),
            organization_name: None,
            statement_lifetime: chrono::Duration::seconds(86400),
            fetch_timeout: Duration::from_millis(5000),
            log_level: Level::INFO,
            signing_key: None,
            admin_token: None,
            trust_anchor_jwks: BTreeMap::new(),
        }
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let entity_id = lookup("OIDFED_ENTITY_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("OIDFED_ENTITY_ID"))?;
        let mut config = Self::new(entity_id.trim());

        if let Some(port) = lookup("OIDFED_PORT") {
            config.port = parse("OIDFED_PORT", &port)?;
        }
        if let Some(kid) = lookup("OIDFED_KEY_ID").filter(|v| !v.is_empty()) {
            config.key_id = kid;
        }
        if let Some(hints) = lookup("OIDFED_AUTHORITY_HINTS") {
            config.authority_hints = split_list(&hints);
        }
        if let Some(anchors) = lookup("OIDFED_TRUST_ANCHORS") {
            config.trust_anchors = split_list(&anchors);
        }
        config.organization_name = lookup("OIDFED_ORGANIZATION_NAME").filter(|v| !v.is_empty());
        if let Some(secs) = lookup("OIDFED_STATEMENT_LIFETIME_SECS") {
            let secs: i64 = parse("OIDFED_STATEMENT_LIFETIME_SECS", &secs)?;
            if !(1..=MAX_STATEMENT_LIFETIME_SECS).contains(&secs) {
                return Err(ConfigError::Invalid {
                    var: "OIDFED_STATEMENT_LIFETIME_SECS",
                    value: secs.to_string(),
                    reason: format!("must be between 1 and {}", MAX_STATEMENT_LIFETIME_SECS),
                });
            }
            config.statement_lifetime =
                chrono::Duration::try_seconds(secs).ok_or_else(|| ConfigError::Invalid {
                    var: "OIDFED_STATEMENT_LIFETIME_SECS",
                    value: secs.to_string(),
                    reason: "out of range".into(),
                })?;
        }
        if let Some(ms) = lookup("OIDFED_FETCH_TIMEOUT_MS") {
            config.fetch_timeout = Duration::from_millis(parse("OIDFED_FETCH_TIMEOUT_MS", &ms)?);
        }
        if let Some(level) = lookup("OIDFED_LOG_LEVEL") {
            config.log_level = parse("OIDFED_LOG_LEVEL", &level)?;
        }
        if let Some(encoded) = lookup("OIDFED_SIGNING_KEY").filter(|v| !v.trim().is_empty()) {
            // a persistent key needs a stable kid, or published jwks stop matching
            if lookup("OIDFED_KEY_ID").filter(|v| !v.is_empty()).is_none() {
                return Err(ConfigError::Missing("OIDFED_KEY_ID"));
            }
            let bytes = decode_signing_key(&encoded)?;
            config.signing_key = Some(KeyPair::from_bytes(config.key_id.clone(), &bytes));
        }
        config.admin_token = lookup("OIDFED_ADMIN_TOKEN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(AdminToken::new);
        if let Some(json) = lookup("OIDFED_TRUST_ANCHOR_JWKS").filter(|v| !v.trim().is_empty()) {
            config.trust_anchor_jwks = parse_anchor_jwks(&json, &config.trust_anchors)?;
        }

        Ok(config)
    }

    /// Trust anchors the resolve endpoint accepts, pinned where keys are configured
    pub fn trust_anchor_set(&self) -> TrustAnchors {
        self.trust_anchors
            .iter()
            .map(|id| match self.trust_anchor_jwks.get(id) {
                Some(jwks) => TrustAnchor::new(id.as_str(), jwks.clone()),
                None => TrustAnchor::unpinned(id.as_str()),
            })
            .collect()
    }

    /// `federation_fetch_endpoint` of this entity
    pub fn fetch_endpoint(&self) -> String {
        format!("{}/fetch", self.entity_id)
    }

    /// `federation_list_endpoint` of this entity
    pub fn list_endpoint(&self) -> String {
        format!("{}/list", self.entity_id)
    }

    /// `federation_resolve_endpoint` of this entity
    pub fn resolve_endpoint(&self) -> String {
        format!("{}/resolve", self.entity_id)
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn decode_signing_key(encoded: &str) -> Result<[u8; 32], ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: "OIDFED_SIGNING_KEY",
        value: "[redacted]".into(),
        reason,
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim().trim_end_matches('='))
        .map_err(|e| invalid(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| invalid(format!("expected 32 bytes, got {}", len)))
}

fn parse_anchor_jwks(
    json: &str,
    trust_anchors: &[String],
) -> Result<BTreeMap<String, JwkSet>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: "OIDFED_TRUST_ANCHOR_JWKS",
        value: json.to_string(),
        reason,
    };
    let raw: BTreeMap<String, JwkSet> =
        serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;

    let mut pinned = BTreeMap::new();
    for (entity_id, jwks) in raw {
        let entity_id = entity_id.trim().trim_end_matches('/').to_string();
        if !trust_anchors.contains(&entity_id) {
            return Err(invalid(format!("'{}' is not a configured trust anchor", entity_id)));
        }
        if jwks.keys.is_empty() {
            return Err(invalid(format!("no keys for '{}'", entity_id)));
        }
        pinned.insert(entity_id, jwks);
    }
    Ok(pinned)
}

fn split_list(value: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let item = item.trim_end_matches('/').to_string();
        if !items.contains(&item) {
            items.push(item);
        }
    }
    items
}
