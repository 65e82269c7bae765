//! # OpenID Federation Core
//!
//! Entity statements, trust chains and the metadata policy algebra of the
//! OpenID Federation trust framework.
//!
//! ## Key Concepts
//!
//! - **Entity Statement**: a signed JWT in which an issuer makes claims about
//!   a subject; self-issued statements are entity configurations
//! - **Trust Anchor**: an entity whose keys are trusted out of band
//! - **Trust Chain**: verified statements from a leaf up to a trust anchor
//! - **Metadata Policy**: per-attribute operators a superior imposes on the
//!   metadata of everything below it
//!
//! ## Chain Invariants
//!
//! 1. **Anchored**: the last statement is issued by a configured trust anchor
//! 2. **Linked**: each statement's subject is the issuer of the one below it
//! 3. **Constrained**: resolved metadata is the leaf's metadata with every
//!    superior's policy applied, combined from the anchor down

pub mod chain;
pub mod crypto;
pub mod error;
pub mod metadata;
pub mod policy;
pub mod statement;
pub mod types;

pub use chain::{
    MaxPathLengthFilter, MinPathLengthFilter, SortOrder, TrustAnchorFilter, TrustChain,
    TrustChainFilter, TrustChains, ValidConstraintsFilter, ValidMetadataFilter,
};
pub use crypto::{JwkSet, KeyPair, PublicKey, ENTITY_STATEMENT_TYP, RESOLVE_RESPONSE_TYP};
pub use error::{FederationError, Result};
pub use metadata::{EntityMetadata, EntityType, Metadata};
pub use policy::{
    MetadataPolicies, MetadataPolicy, MetadataPolicyEntry, PolicyEngine, PolicyError, Value,
};
pub use statement::{EntityStatement, EntityStatementClaims, TrustAnchor, TrustAnchors};
pub use types::{Constraints, NamingConstraints};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
