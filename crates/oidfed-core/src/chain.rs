//! Trust chains
//!
//! A trust chain is an ordered sequence of verified statements from a leaf's
//! entity configuration (index 0) up to a statement issued by a trust anchor
//! (last index). For every link `chain[i + 1].subject == chain[i].issuer`.
//!
//! The resolver usually finds several chains. [`TrustChains`] filters and
//! orders them; filters compose left to right and stop as soon as nothing is
//! left.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{FederationError, Result};
use crate::metadata::Metadata;
use crate::policy::PolicyEngine;
use crate::statement::EntityStatement;

/// A verified path from a leaf entity to a trust anchor
#[derive(Debug, Clone, PartialEq)]
pub struct TrustChain {
    statements: Vec<EntityStatement>,
}

impl TrustChain {
    /// Create a chain from statements ordered leaf first
    pub fn new(statements: Vec<EntityStatement>) -> Self {
        Self { statements }
    }

    /// Statements ordered leaf first
    pub fn statements(&self) -> &[EntityStatement] {
        &self.statements
    }

    /// Compact JWS of every statement, leaf first
    pub fn to_jws_list(&self) -> Vec<String> {
        self.statements.iter().map(|s| s.jws().to_string()).collect()
    }

    /// The leaf's entity configuration
    pub fn leaf(&self) -> Option<&EntityStatement> {
        self.statements.first()
    }

    /// Entity identifier of the leaf
    pub fn subject(&self) -> Option<&str> {
        self.leaf().map(|s| s.issuer())
    }

    /// Entity identifier of the trust anchor that issued the last statement
    pub fn trust_anchor_id(&self) -> Option<&str> {
        self.statements.last().map(|s| s.issuer())
    }

    /// Number of statements
    pub fn path_len(&self) -> usize {
        self.statements.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Earliest expiration across the chain
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.statements.iter().map(|s| s.expires_at()).min()
    }

    /// Resolved metadata using the standard policy operators
    pub fn metadata(&self) -> Result<Metadata> {
        self.metadata_with(&PolicyEngine::standard())
    }

    /// Resolved metadata using the given policy engine
    ///
    /// A single-statement chain yields the leaf's metadata unchanged.
    /// Otherwise the immediate superior's `metadata` claim overrides the
    /// leaf's attributes, and every statement's policy is combined from the
    /// anchor down and applied to the result.
    pub fn metadata_with(&self, engine: &PolicyEngine) -> Result<Metadata> {
        let leaf = self.leaf().ok_or(FederationError::EmptyChain)?;
        if self.statements.len() == 1 {
            return Ok(leaf.metadata().clone());
        }

        for statement in &self.statements {
            engine.check_critical(statement.metadata_policy_crit())?;
        }

        let mut metadata = leaf.metadata().clone();
        metadata.override_with(self.statements[1].metadata());

        let policies = engine
            .merge_metadata_policies(self.statements.iter().rev().map(|s| s.metadata_policy()))?;
        Ok(engine.apply(&policies, &metadata)?)
    }

    /// Check every superior's constraints against the chain below it
    pub fn check_constraints(&self) -> Result<()> {
        let leaf = self.leaf().ok_or(FederationError::EmptyChain)?;
        for (j, statement) in self.statements.iter().enumerate().skip(1) {
            let Some(constraints) = statement.constraints() else {
                continue;
            };
            constraints.check_path_length(j - 1)?;
            for below in &self.statements[..=j] {
                constraints.check_entity_id(below.subject())?;
            }
            constraints.check_entity_types(leaf.metadata())?;
        }
        Ok(())
    }
}

/// Narrows a set of candidate chains
pub trait TrustChainFilter: Send + Sync {
    /// Keep the chains that pass
    fn filter(&self, chains: Vec<TrustChain>) -> Vec<TrustChain>;
}

/// Keeps chains ending at one of the given trust anchors
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorFilter {
    anchors: Vec<String>,
}

impl TrustAnchorFilter {
    /// Create a filter for the given anchor identifiers
    pub fn new<I, S>(anchors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            anchors: anchors.into_iter().map(Into::into).collect(),
        }
    }
}

impl TrustChainFilter for TrustAnchorFilter {
    fn filter(&self, chains: Vec<TrustChain>) -> Vec<TrustChain> {
        chains
            .into_iter()
            .filter(|c| {
                c.trust_anchor_id()
                    .map(|id| self.anchors.iter().any(|a| a == id))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Keeps only the shortest chains in the candidate set
#[derive(Debug, Clone, Copy, Default)]
pub struct MinPathLengthFilter;

impl TrustChainFilter for MinPathLengthFilter {
    fn filter(&self, chains: Vec<TrustChain>) -> Vec<TrustChain> {
        let Some(min) = chains.iter().map(|c| c.path_len()).min() else {
            return chains;
        };
        chains.into_iter().filter(|c| c.path_len() == min).collect()
    }
}

/// Drops chains with more statements than the limit
#[derive(Debug, Clone, Copy)]
pub struct MaxPathLengthFilter {
    max: usize,
}

impl MaxPathLengthFilter {
    /// Create a filter allowing at most `max` statements
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl TrustChainFilter for MaxPathLengthFilter {
    fn filter(&self, chains: Vec<TrustChain>) -> Vec<TrustChain> {
        chains.into_iter().filter(|c| c.path_len() <= self.max).collect()
    }
}

/// Keeps chains whose metadata resolves without a policy error
#[derive(Debug, Clone, Default)]
pub struct ValidMetadataFilter {
    engine: PolicyEngine,
}

impl ValidMetadataFilter {
    /// Create a filter using the given policy engine
    pub fn new(engine: PolicyEngine) -> Self {
        Self { engine }
    }
}

impl TrustChainFilter for ValidMetadataFilter {
    fn filter(&self, chains: Vec<TrustChain>) -> Vec<TrustChain> {
        chains
            .into_iter()
            .filter(|c| match c.metadata_with(&self.engine) {
                Ok(_) => true,
                Err(e) => {
                    debug!(
                        anchor = ?c.trust_anchor_id(),
                        error = %e,
                        "Dropping chain with unresolvable metadata"
                    );
                    false
                }
            })
            .collect()
    }
}

/// Keeps chains that satisfy every superior's constraints
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidConstraintsFilter;

impl TrustChainFilter for ValidConstraintsFilter {
    fn filter(&self, chains: Vec<TrustChain>) -> Vec<TrustChain> {
        chains
            .into_iter()
            .filter(|c| match c.check_constraints() {
                Ok(()) => true,
                Err(e) => {
                    debug!(
                        anchor = ?c.trust_anchor_id(),
                        error = %e,
                        "Dropping chain violating constraints"
                    );
                    false
                }
            })
            .collect()
    }
}

/// Sort direction for [`TrustChains::sort`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Lowest score first
    #[default]
    Ascending,
    /// Highest score first
    Descending,
}

/// A collection of trust chains
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrustChains(Vec<TrustChain>);

impl TrustChains {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chain unless an identical one is already present
    pub fn push(&mut self, chain: TrustChain) {
        if !self.0.contains(&chain) {
            self.0.push(chain);
        }
    }

    /// Add every chain from another collection
    pub fn extend(&mut self, other: TrustChains) {
        for chain in other.0 {
            self.push(chain);
        }
    }

    /// Apply filters left to right, stopping once nothing is left
    pub fn filter(&self, filters: &[&dyn TrustChainFilter]) -> TrustChains {
        let mut chains = self.0.clone();
        for filter in filters {
            if chains.is_empty() {
                break;
            }
            chains = filter.filter(chains);
        }
        TrustChains(chains)
    }

    /// Sort by path length
    pub fn sort(&self, order: SortOrder) -> TrustChains {
        self.sort_by_score(order, |c| c.path_len() as i64)
    }

    /// Sort by a caller-supplied score; ties keep their current order
    pub fn sort_by_score<F>(&self, order: SortOrder, score: F) -> TrustChains
    where
        F: Fn(&TrustChain) -> i64,
    {
        let mut chains = self.0.clone();
        chains.sort_by(|a, b| {
            let ordering = score(a).cmp(&score(b));
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });
        TrustChains(chains)
    }

    /// The chain that sorts first under `order` by path length
    pub fn best(&self, order: SortOrder) -> Option<&TrustChain> {
        self.0.iter().min_by(|a, b| {
            let ordering = a.path_len().cmp(&b.path_len());
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        })
    }

    /// Iterate over chains
    pub fn iter(&self) -> impl Iterator<Item = &TrustChain> {
        self.0.iter()
    }

    /// Number of chains
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume into the underlying list
    pub fn into_vec(self) -> Vec<TrustChain> {
        self.0
    }
}

impl From<Vec<TrustChain>> for TrustChains {
    fn from(chains: Vec<TrustChain>) -> Self {
        let mut collection = TrustChains::new();
        for chain in chains {
            collection.push(chain);
        }
        collection
    }
}

impl FromIterator<TrustChain> for TrustChains {
    fn from_iter<I: IntoIterator<Item = TrustChain>>(iter: I) -> Self {
        iter.into_iter().collect::<Vec<_>>().into()
    }
}

impl IntoIterator for TrustChains {
    type Item = TrustChain;
    type IntoIter = std::vec::IntoIter<TrustChain>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
