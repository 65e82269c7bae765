//! Metadata policy algebra
//!
//! Superiors constrain the metadata of their subordinates with per-attribute
//! policy entries. Along a trust chain the entries are combined from the
//! trust anchor downwards into a single policy, every combined entry is
//! checked by the verifiers, and the result is applied to the leaf's
//! metadata.
//!
//! The [`PolicyEngine`] owns the ordered operator list and the verifier
//! list. [`PolicyEngine::standard`] carries the seven operators defined by
//! OpenID Federation; callers may register additional ones.

pub mod operators;
pub mod value;
pub mod verifiers;

pub use operators::{
    AddOperator, DefaultOperator, EssentialOperator, OneOfOperator, PolicyOperator,
    SubsetOfOperator, SupersetOfOperator, ValueOperator, OPERATOR_ORDER,
};
pub use value::Value;
pub use verifiers::{
    AddSubsetVerifier, OperatorCompatibilityVerifier, PolicyVerifier, SubsetSupersetVerifier,
    ValueConsistencyVerifier, ValueDefaultVerifier,
};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::metadata::{EntityMetadata, EntityType, Metadata};

/// Errors raised while combining or applying metadata policies
///
/// `path` names the attribute as `entity_type.attribute`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Two operator values cannot be reconciled
    #[error("{path}: conflicting values for operator '{operator}'")]
    Conflict { path: String, operator: String },

    /// Two operators may not appear on the same attribute
    #[error("{path}: operator '{operator}' cannot be combined with '{other}'")]
    IncompatibleOperators {
        path: String,
        operator: String,
        other: String,
    },

    /// A combined entry can never be satisfied
    #[error("{path}: inconsistent policy: {message}")]
    Inconsistent { path: String, message: String },

    /// An operator check failed while applying the policy
    #[error("{path}: operator '{operator}' violated: {message}")]
    Violation {
        path: String,
        operator: String,
        message: String,
    },

    /// The operator value has the wrong shape
    #[error("{path}: invalid value for operator '{operator}': {message}")]
    InvalidOperatorValue {
        path: String,
        operator: String,
        message: String,
    },

    /// A critical operator is not understood by this engine
    #[error("unsupported critical policy operator '{operator}'")]
    UnsupportedCritical { operator: String },
}

/// Policy for one attribute: operator name to operator value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataPolicyEntry(BTreeMap<String, JsonValue>);

impl MetadataPolicyEntry {
    /// Create an empty entry
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an operator (builder pattern)
    pub fn with(mut self, operator: impl Into<String>, value: JsonValue) -> Self {
        self.0.insert(operator.into(), value);
        self
    }

    /// Set an operator
    pub fn insert(&mut self, operator: impl Into<String>, value: JsonValue) {
        self.0.insert(operator.into(), value);
    }

    /// Raw operator value
    pub fn get(&self, operator: &str) -> Option<&JsonValue> {
        self.0.get(operator)
    }

    /// Operator value as a policy [`Value`]
    pub fn value(&self, operator: &str) -> Option<Value> {
        self.0.get(operator).map(Value::from_json)
    }

    /// Check if an operator is present
    pub fn contains(&self, operator: &str) -> bool {
        self.0.contains_key(operator)
    }

    /// Operator names present on this entry
    pub fn operators(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Whether the attribute is marked essential
    pub fn is_essential(&self) -> bool {
        self.0
            .get(operators::ESSENTIAL)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Policy for one entity type: attribute name to entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataPolicy(BTreeMap<String, MetadataPolicyEntry>);

impl MetadataPolicy {
    /// Create an empty policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute entry (builder pattern)
    pub fn with(mut self, attribute: impl Into<String>, entry: MetadataPolicyEntry) -> Self {
        self.0.insert(attribute.into(), entry);
        self
    }

    /// Entry for an attribute
    pub fn get(&self, attribute: &str) -> Option<&MetadataPolicyEntry> {
        self.0.get(attribute)
    }

    /// Iterate over attribute entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataPolicyEntry)> {
        self.0.iter()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Policies for all entity types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataPolicies(BTreeMap<EntityType, MetadataPolicy>);

impl MetadataPolicies {
    /// Create empty policies
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the policy for an entity type (builder pattern)
    pub fn with(mut self, entity_type: EntityType, policy: MetadataPolicy) -> Self {
        self.0.insert(entity_type, policy);
        self
    }

    /// Policy for an entity type
    pub fn get(&self, entity_type: &EntityType) -> Option<&MetadataPolicy> {
        self.0.get(entity_type)
    }

    /// Iterate over entity types and their policies
    pub fn iter(&self) -> impl Iterator<Item = (&EntityType, &MetadataPolicy)> {
        self.0.iter()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ordered operators plus the verifiers run after every combination
#[derive(Clone)]
pub struct PolicyEngine {
    operators: Vec<Arc<dyn PolicyOperator>>,
    verifiers: Vec<Arc<dyn PolicyVerifier>>,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field(
                "operators",
                &self.operators.iter().map(|o| o.name()).collect::<Vec<_>>(),
            )
            .field(
                "verifiers",
                &self.verifiers.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::standard()
    }
}

impl PolicyEngine {
    /// Create an engine without operators or verifiers
    pub fn empty() -> Self {
        Self {
            operators: Vec::new(),
            verifiers: Vec::new(),
        }
    }

    /// Create an engine with the standard operators and verifiers
    pub fn standard() -> Self {
        Self {
            operators: operators::standard_operators(),
            verifiers: verifiers::standard_verifiers(),
        }
    }

    /// Append an operator; it runs after the ones already registered
    pub fn with_operator<O: PolicyOperator + 'static>(mut self, operator: O) -> Self {
        self.operators.push(Arc::new(operator));
        self
    }

    /// Append a verifier
    pub fn with_verifier<V: PolicyVerifier + 'static>(mut self, verifier: V) -> Self {
        self.verifiers.push(Arc::new(verifier));
        self
    }

    /// Look up an operator by name
    pub fn operator(&self, name: &str) -> Option<&dyn PolicyOperator> {
        self.operators
            .iter()
            .find(|o| o.name() == name)
            .map(|o| o.as_ref())
    }

    /// Operator names in apply order
    pub fn operator_names(&self) -> Vec<&str> {
        self.operators.iter().map(|o| o.name()).collect()
    }

    /// Fail if any critical operator is unknown to this engine
    pub fn check_critical<'a>(
        &self,
        critical: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), PolicyError> {
        for name in critical {
            if self.operator(name).is_none() {
                return Err(PolicyError::UnsupportedCritical {
                    operator: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Run every verifier against an entry
    pub fn verify_entry(&self, entry: &MetadataPolicyEntry, path: &str) -> Result<(), PolicyError> {
        for verifier in &self.verifiers {
            verifier.verify(self, entry, path)?;
        }
        Ok(())
    }

    /// Combine two entries for the same attribute, operator by operator
    pub fn combine_entries(
        &self,
        parent: &MetadataPolicyEntry,
        child: &MetadataPolicyEntry,
        path: &str,
    ) -> Result<MetadataPolicyEntry, PolicyError> {
        let mut combined = parent.clone();
        for (name, child_value) in &child.0 {
            let Some(parent_value) = parent.get(name) else {
                combined.insert(name.clone(), child_value.clone());
                continue;
            };
            let merged = match self.operator(name) {
                Some(operator) => operator
                    .merge(
                        &Value::from_json(parent_value),
                        &Value::from_json(child_value),
                        path,
                    )?
                    .to_json(),
                None if parent_value == child_value => parent_value.clone(),
                None => {
                    return Err(PolicyError::Conflict {
                        path: path.to_string(),
                        operator: name.clone(),
                    })
                }
            };
            combined.insert(name.clone(), merged);
        }
        self.verify_entry(&combined, path)?;
        Ok(combined)
    }

    /// Combine two policies for one entity type
    ///
    /// Attributes present on one side only pass through unchanged; every
    /// resulting entry is verified.
    pub fn combine(
        &self,
        parent: &MetadataPolicy,
        child: &MetadataPolicy,
        path: &str,
    ) -> Result<MetadataPolicy, PolicyError> {
        let mut combined = BTreeMap::new();
        let attributes: BTreeSet<&String> = parent.0.keys().chain(child.0.keys()).collect();
        for attribute in attributes {
            let attribute_path = format!("{}.{}", path, attribute);
            let entry = match (parent.get(attribute), child.get(attribute)) {
                (Some(p), Some(c)) => self.combine_entries(p, c, &attribute_path)?,
                (Some(only), None) | (None, Some(only)) => {
                    self.verify_entry(only, &attribute_path)?;
                    only.clone()
                }
                (None, None) => continue,
            };
            combined.insert(attribute.clone(), entry);
        }
        Ok(MetadataPolicy(combined))
    }

    /// Combine policies for every entity type bucket
    pub fn combine_policies(
        &self,
        parent: &MetadataPolicies,
        child: &MetadataPolicies,
    ) -> Result<MetadataPolicies, PolicyError> {
        let empty = MetadataPolicy::new();
        let mut combined = BTreeMap::new();
        let types: BTreeSet<&EntityType> = parent.0.keys().chain(child.0.keys()).collect();
        for entity_type in types {
            let p = parent.get(entity_type).unwrap_or(&empty);
            let c = child.get(entity_type).unwrap_or(&empty);
            let policy = self.combine(p, c, entity_type.as_str())?;
            combined.insert(entity_type.clone(), policy);
        }
        Ok(MetadataPolicies(combined))
    }

    /// Fold policies from the most senior (trust anchor) to the most junior
    pub fn merge_metadata_policies<'a>(
        &self,
        policies: impl IntoIterator<Item = &'a MetadataPolicies>,
    ) -> Result<MetadataPolicies, PolicyError> {
        policies
            .into_iter()
            .try_fold(MetadataPolicies::new(), |acc, next| {
                self.combine_policies(&acc, next)
            })
    }

    /// Apply an entry to one attribute state
    ///
    /// `current` is `None` when the attribute is absent. Operators run in
    /// engine order; unknown operators on the entry are skipped.
    pub fn apply_entry(
        &self,
        entry: &MetadataPolicyEntry,
        current: Option<Value>,
        path: &str,
    ) -> Result<Option<Value>, PolicyError> {
        let essential = entry.is_essential();
        let mut state = current;
        for operator in &self.operators {
            if let Some(policy_value) = entry.value(operator.name()) {
                state = operator.apply(state, &policy_value, essential, path)?;
            }
        }
        for name in entry.operators() {
            if self.operator(name).is_none() {
                debug!(path = %path, operator = %name, "Skipping unknown policy operator");
            }
        }
        Ok(state)
    }

    /// Apply a policy to the attribute bag of one entity type
    pub fn apply_to_attributes(
        &self,
        policy: &MetadataPolicy,
        attributes: &EntityMetadata,
        path: &str,
    ) -> Result<EntityMetadata, PolicyError> {
        let mut result = attributes.clone();
        for (attribute, entry) in policy.iter() {
            let attribute_path = format!("{}.{}", path, attribute);
            let current = attributes.get(attribute).map(Value::from_json);
            match self.apply_entry(entry, current, &attribute_path)? {
                Some(value) => result.insert(attribute.clone(), value.to_json()),
                None => {
                    result.remove(attribute);
                }
            }
        }
        Ok(result)
    }

    /// Apply combined policies to metadata
    ///
    /// Entity types without a policy are returned unchanged; policies for
    /// entity types the metadata does not carry are ignored.
    pub fn apply(
        &self,
        policies: &MetadataPolicies,
        metadata: &Metadata,
    ) -> Result<Metadata, PolicyError> {
        let mut result = Metadata::new();
        for (entity_type, attributes) in metadata.iter() {
            let applied = match policies.get(entity_type) {
                Some(policy) => {
                    self.apply_to_attributes(policy, attributes, entity_type.as_str())?
                }
                None => attributes.clone(),
            };
            result.insert(entity_type.clone(), applied);
        }
        Ok(result)
    }
}
