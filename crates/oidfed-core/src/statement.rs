//! Entity statements and trust anchors
//!
//! An entity statement is a signed JWT in which `iss` makes claims about
//! `sub`. When `iss == sub` it is the entity configuration an entity
//! publishes about itself; otherwise it is a subordinate statement issued by
//! a superior. Statements are immutable once parsed and keep their original
//! compact serialization so they can be forwarded or re-verified.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::crypto::{decode_unverified, verify_jws, JwkSet, KeyPair, ENTITY_STATEMENT_TYP};
use crate::error::{FederationError, Result};
use crate::metadata::Metadata;
use crate::policy::MetadataPolicies;
use crate::types::Constraints;

/// Payload of an entity statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStatementClaims {
    /// Issuer entity identifier
    #[serde(rename = "iss")]
    pub issuer: String,

    /// Subject entity identifier
    #[serde(rename = "sub")]
    pub subject: String,

    /// Issued at
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    /// Expiration
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    /// Federation signing keys of the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    /// Immediate superiors (entity configurations only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authority_hints: Vec<String>,

    /// Metadata keyed by entity type
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,

    /// Policies the issuer places on the subject's metadata
    #[serde(default, skip_serializing_if = "MetadataPolicies::is_empty")]
    pub metadata_policy: MetadataPolicies,

    /// Policy operators that must be understood to use this statement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata_policy_crit: Vec<String>,

    /// Constraints on the chain below the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,

    /// Trust mark issuers recognized by a trust anchor (carried, not interpreted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_mark_issuers: Option<JsonValue>,

    /// Trust mark owners recognized by a trust anchor (carried, not interpreted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_mark_owners: Option<JsonValue>,

    /// Endpoint the statement was fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_endpoint: Option<String>,

    /// Claims this library does not model, preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl EntityStatementClaims {
    /// Create claims valid from now for `lifetime`
    ///
    /// An expiry past the representable range saturates instead of overflowing.
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>, lifetime: Duration) -> Self {
        let now = Utc::now().trunc_subsecs(0);
        let saturated = if lifetime < Duration::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        };
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            issued_at: now,
            expires_at: now.checked_add_signed(lifetime).unwrap_or(saturated),
            jwks: None,
            authority_hints: Vec::new(),
            metadata: Metadata::new(),
            metadata_policy: MetadataPolicies::new(),
            metadata_policy_crit: Vec::new(),
            constraints: None,
            trust_mark_issuers: None,
            trust_mark_owners: None,
            source_endpoint: None,
            extra: Map::new(),
        }
    }

    /// Create entity configuration claims (`iss == sub`)
    pub fn configuration(entity_id: impl Into<String>, lifetime: Duration) -> Self {
        let entity_id = entity_id.into();
        Self::new(entity_id.clone(), entity_id, lifetime)
    }

    /// Set the validity window explicitly
    pub fn with_validity(mut self, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        self.issued_at = issued_at;
        self.expires_at = expires_at;
        self
    }

    /// Set the subject's keys
    pub fn with_jwks(mut self, jwks: JwkSet) -> Self {
        self.jwks = Some(jwks);
        self
    }

    /// Add an authority hint
    pub fn with_authority_hint(mut self, authority: impl Into<String>) -> Self {
        let authority = authority.into();
        if !self.authority_hints.contains(&authority) {
            self.authority_hints.push(authority);
        }
        self
    }

    /// Set metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set metadata policies
    pub fn with_metadata_policy(mut self, policy: MetadataPolicies) -> Self {
        self.metadata_policy = policy;
        self
    }

    /// Mark a policy operator as critical
    pub fn with_critical_operator(mut self, operator: impl Into<String>) -> Self {
        self.metadata_policy_crit.push(operator.into());
        self
    }

    /// Set constraints
    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    /// Set the source endpoint
    pub fn with_source_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.source_endpoint = Some(endpoint.into());
        self
    }
}

/// A parsed entity statement together with its compact JWS
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStatement {
    claims: EntityStatementClaims,
    jws: String,
}

impl EntityStatement {
    /// Parse a compact JWS into a statement
    ///
    /// The header `typ` must be `entity-statement+jwt`, so other JWTs signed
    /// with a federation key are never taken for statements.
    ///
    /// Note: This does NOT verify the signature. Use [`EntityStatement::verify`]
    /// once the issuer's keys are known.
    pub fn parse(jws: impl Into<String>) -> Result<Self> {
        let jws = jws.into();
        let (header, claims) = decode_unverified::<EntityStatementClaims>(jws.trim())?;
        if header.typ.as_deref() != Some(ENTITY_STATEMENT_TYP) {
            return Err(FederationError::InvalidStatement(format!(
                "unexpected JWS typ {:?}",
                header.typ
            )));
        }
        Ok(Self {
            claims,
            jws: jws.trim().to_string(),
        })
    }

    /// Sign claims and return the resulting statement
    ///
    /// The claims are read back from the signed form, so timestamps carry
    /// the same second precision a verifier sees.
    pub fn sign(claims: &EntityStatementClaims, key: &KeyPair) -> Result<Self> {
        Self::parse(key.sign_statement(claims)?)
    }

    /// Verify the signature against a key set
    pub fn verify(&self, jwks: &JwkSet) -> Result<()> {
        verify_jws::<JsonValue>(&self.jws, jwks).map(|_| ())
    }

    /// Verify the signature against the statement's own `jwks`
    pub fn verify_self_signed(&self) -> Result<()> {
        let jwks = self
            .claims
            .jwks
            .as_ref()
            .ok_or_else(|| FederationError::MissingField("jwks".into()))?;
        self.verify(jwks)
    }

    /// Check `iat <= now <= exp`
    pub fn check_validity(&self, now: DateTime<Utc>) -> Result<()> {
        if now < self.claims.issued_at {
            return Err(FederationError::NotYetValid(
                self.claims.issued_at.to_rfc3339(),
            ));
        }
        if now > self.claims.expires_at {
            return Err(FederationError::Expired(self.claims.expires_at.to_rfc3339()));
        }
        Ok(())
    }

    /// Whether the statement is inside its validity window at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.check_validity(now).is_ok()
    }

    /// Whether this is an entity configuration (`iss == sub`)
    pub fn is_self_signed(&self) -> bool {
        self.claims.issuer == self.claims.subject
    }

    /// The decoded payload
    pub fn claims(&self) -> &EntityStatementClaims {
        &self.claims
    }

    /// The compact JWS serialization
    pub fn jws(&self) -> &str {
        &self.jws
    }

    /// Issuer entity identifier
    pub fn issuer(&self) -> &str {
        &self.claims.issuer
    }

    /// Subject entity identifier
    pub fn subject(&self) -> &str {
        &self.claims.subject
    }

    /// Issued at
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.claims.issued_at
    }

    /// Expiration
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.claims.expires_at
    }

    /// Subject keys, if the statement carries any
    pub fn jwks(&self) -> Option<&JwkSet> {
        self.claims.jwks.as_ref()
    }

    /// Authority hints
    pub fn authority_hints(&self) -> &[String] {
        &self.claims.authority_hints
    }

    /// Metadata
    pub fn metadata(&self) -> &Metadata {
        &self.claims.metadata
    }

    /// Metadata policies
    pub fn metadata_policy(&self) -> &MetadataPolicies {
        &self.claims.metadata_policy
    }

    /// Critical policy operators
    pub fn metadata_policy_crit(&self) -> &[String] {
        &self.claims.metadata_policy_crit
    }

    /// Constraints
    pub fn constraints(&self) -> Option<&Constraints> {
        self.claims.constraints.as_ref()
    }

    /// The fetch endpoint declared in `federation_entity` metadata
    pub fn fetch_endpoint(&self) -> Option<&str> {
        self.claims.metadata.fetch_endpoint()
    }
}

/// A configured trust anchor
///
/// An empty key set means the anchor's own published configuration keys are
/// accepted on first use.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustAnchor {
    /// Entity identifier of the anchor
    pub entity_id: String,
    /// Keys the anchor is known to sign with
    pub jwks: JwkSet,
}

impl TrustAnchor {
    /// Create an anchor pinned to the given keys
    pub fn new(entity_id: impl Into<String>, jwks: JwkSet) -> Self {
        Self {
            entity_id: entity_id.into(),
            jwks,
        }
    }

    /// Create an anchor whose keys are taken from its own configuration
    pub fn unpinned(entity_id: impl Into<String>) -> Self {
        Self::new(entity_id, JwkSet { keys: Vec::new() })
    }

    /// Whether keys are configured for this anchor
    pub fn is_pinned(&self) -> bool {
        !self.jwks.keys.is_empty()
    }
}

/// The set of trust anchors a resolution is bounded by
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrustAnchors(Vec<TrustAnchor>);

impl TrustAnchors {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an anchor (builder pattern); a later entry replaces an earlier one
    pub fn with(mut self, anchor: TrustAnchor) -> Self {
        self.insert(anchor);
        self
    }

    /// Add an anchor, replacing one with the same entity identifier
    pub fn insert(&mut self, anchor: TrustAnchor) {
        self.0.retain(|a| a.entity_id != anchor.entity_id);
        self.0.push(anchor);
    }

    /// Look up an anchor
    pub fn get(&self, entity_id: &str) -> Option<&TrustAnchor> {
        self.0.iter().find(|a| a.entity_id == entity_id)
    }

    /// Check if an entity is a configured anchor
    pub fn contains(&self, entity_id: &str) -> bool {
        self.get(entity_id).is_some()
    }

    /// Iterate over anchors
    pub fn iter(&self) -> impl Iterator<Item = &TrustAnchor> {
        self.0.iter()
    }

    /// Anchor entity identifiers
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|a| a.entity_id.as_str())
    }

    /// Number of anchors
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<TrustAnchor> for TrustAnchors {
    fn from_iter<I: IntoIterator<Item = TrustAnchor>>(iter: I) -> Self {
        let mut anchors = TrustAnchors::new();
        for anchor in iter {
            anchors.insert(anchor);
        }
        anchors
    }
}
