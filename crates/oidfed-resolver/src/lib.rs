//! # OpenID Federation Resolver
//!
//! Discovers and verifies trust chains by walking authority hints from a
//! starting entity up to a set of trust anchors.
//!
//! ## Architecture
//!
//! The resolver asks an [`EntityStatementProvider`] for statements:
//!
//! - **HTTP**: fetches well-known configurations and fetch endpoints, with a
//!   TTL-bounded cache
//! - **In-memory**: serves pre-signed statements, for tests and out-of-band
//!   distribution
//!
//! ## Usage
//!
//! ```ignore
//! use oidfed_core::{TrustAnchor, TrustAnchors};
//! use oidfed_resolver::{HttpProvider, TrustResolver};
//! use std::sync::Arc;
//!
//! let resolver = TrustResolver::new(Arc::new(HttpProvider::new()?));
//! let anchors = TrustAnchors::new().with(TrustAnchor::unpinned("https://ta.example.com"));
//!
//! let chains = resolver
//!     .resolve_to_valid_chains("https://rp.example.com", &anchors)
//!     .await;
//! for chain in chains.iter() {
//!     println!("{:?}", chain.metadata()?);
//! }
//! ```

pub mod error;
pub mod providers;
pub mod resolver;

pub use error::{ResolveError, Result};
pub use providers::{EntityStatementProvider, HttpProvider, HttpProviderConfig, InMemoryProvider};
pub use resolver::{ResolverConfig, TrustResolver};
