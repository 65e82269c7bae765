//! Consistency checks for combined policy entries
//!
//! A combined entry may hold operators whose values can never be satisfied
//! together. The verifiers reject such entries right after combination so
//! that the failure points at the hop that introduced it.

use std::sync::Arc;

use super::operators::{ADD, DEFAULT, ONE_OF, SUBSET_OF, SUPERSET_OF, VALUE};
use super::{MetadataPolicyEntry, PolicyEngine, PolicyError};

/// A consistency rule over a single policy entry
pub trait PolicyVerifier: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Reject entries that can never be satisfied
    fn verify(
        &self,
        engine: &PolicyEngine,
        entry: &MetadataPolicyEntry,
        path: &str,
    ) -> Result<(), PolicyError>;
}

/// The standard verifiers
pub fn standard_verifiers() -> Vec<Arc<dyn PolicyVerifier>> {
    vec![
        Arc::new(OperatorCompatibilityVerifier),
        Arc::new(ValueConsistencyVerifier),
        Arc::new(ValueDefaultVerifier),
        Arc::new(AddSubsetVerifier),
        Arc::new(SubsetSupersetVerifier),
    ]
}

fn inconsistent(path: &str, message: impl Into<String>) -> PolicyError {
    PolicyError::Inconsistent {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Rejects operator pairs that an operator declares incompatible
#[derive(Debug, Clone, Copy, Default)]
pub struct OperatorCompatibilityVerifier;

impl PolicyVerifier for OperatorCompatibilityVerifier {
    fn name(&self) -> &str {
        "operator_compatibility"
    }

    fn verify(
        &self,
        engine: &PolicyEngine,
        entry: &MetadataPolicyEntry,
        path: &str,
    ) -> Result<(), PolicyError> {
        for name in entry.operators() {
            let Some(operator) = engine.operator(name) else {
                continue;
            };
            for other in entry.operators().filter(|o| *o != name) {
                if !operator.may_combine_with(other) {
                    return Err(PolicyError::IncompatibleOperators {
                        path: path.to_string(),
                        operator: name.clone(),
                        other: other.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// `value` must satisfy every other operator on the entry
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueConsistencyVerifier;

impl PolicyVerifier for ValueConsistencyVerifier {
    fn name(&self) -> &str {
        "value_consistency"
    }

    fn verify(
        &self,
        _engine: &PolicyEngine,
        entry: &MetadataPolicyEntry,
        path: &str,
    ) -> Result<(), PolicyError> {
        let Some(value) = entry.value(VALUE) else {
            return Ok(());
        };

        if value.is_null() {
            if entry.is_essential() {
                return Err(inconsistent(path, "essential attribute is forced to null"));
            }
            return Ok(());
        }

        if let Some(add) = entry.value(ADD) {
            if !value.contains_all(&add) {
                return Err(inconsistent(path, "add values are not contained in value"));
            }
        }
        if let Some(one_of) = entry.value(ONE_OF) {
            let items = value.items();
            if items.len() != 1 || !one_of.contains(&items[0]) {
                return Err(inconsistent(path, "value is not one of the allowed values"));
            }
        }
        if let Some(subset_of) = entry.value(SUBSET_OF) {
            if !subset_of.contains_all(&value) {
                return Err(inconsistent(path, "value is not a subset of subset_of"));
            }
        }
        if let Some(superset_of) = entry.value(SUPERSET_OF) {
            if !value.contains_all(&superset_of) {
                return Err(inconsistent(path, "value is not a superset of superset_of"));
            }
        }
        Ok(())
    }
}

/// A `null` value leaves nothing for `default` to fill
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueDefaultVerifier;

impl PolicyVerifier for ValueDefaultVerifier {
    fn name(&self) -> &str {
        "value_default"
    }

    fn verify(
        &self,
        _engine: &PolicyEngine,
        entry: &MetadataPolicyEntry,
        path: &str,
    ) -> Result<(), PolicyError> {
        let value_is_null = entry.value(VALUE).map(|v| v.is_null()).unwrap_or(false);
        if value_is_null && entry.contains(DEFAULT) {
            return Err(inconsistent(path, "default combined with a null value"));
        }
        Ok(())
    }
}

/// `add` values must survive `subset_of`
#[derive(Debug, Clone, Copy, Default)]
pub struct AddSubsetVerifier;

impl PolicyVerifier for AddSubsetVerifier {
    fn name(&self) -> &str {
        "add_subset"
    }

    fn verify(
        &self,
        _engine: &PolicyEngine,
        entry: &MetadataPolicyEntry,
        path: &str,
    ) -> Result<(), PolicyError> {
        if let (Some(add), Some(subset_of)) = (entry.value(ADD), entry.value(SUBSET_OF)) {
            if !subset_of.contains_all(&add) {
                return Err(inconsistent(path, "add values are not contained in subset_of"));
            }
        }
        Ok(())
    }
}

/// `superset_of` must be contained in `subset_of`
#[derive(Debug, Clone, Copy, Default)]
pub struct SubsetSupersetVerifier;

impl PolicyVerifier for SubsetSupersetVerifier {
    fn name(&self) -> &str {
        "subset_superset"
    }

    fn verify(
        &self,
        _engine: &PolicyEngine,
        entry: &MetadataPolicyEntry,
        path: &str,
    ) -> Result<(), PolicyError> {
        if let (Some(subset_of), Some(superset_of)) =
            (entry.value(SUBSET_OF), entry.value(SUPERSET_OF))
        {
            if !subset_of.contains_all(&superset_of) {
                return Err(inconsistent(path, "superset_of is not contained in subset_of"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verify(entry: serde_json::Value) -> Result<(), PolicyError> {
        let entry: MetadataPolicyEntry = serde_json::from_value(entry).unwrap();
        PolicyEngine::standard().verify_entry(&entry, "openid_provider.attr")
    }

    #[test]
    fn test_one_of_with_subset_or_superset_rejected() {
        assert!(matches!(
            verify(json!({"one_of": ["a"], "subset_of": ["a"]})),
            Err(PolicyError::IncompatibleOperators { .. })
        ));
        assert!(matches!(
            verify(json!({"one_of": ["a"], "superset_of": ["a"]})),
            Err(PolicyError::IncompatibleOperators { .. })
        ));
        assert!(matches!(
            verify(json!({"one_of": ["a"], "add": ["a"]})),
            Err(PolicyError::IncompatibleOperators { .. })
        ));
    }

    #[test]
    fn test_add_must_be_within_subset() {
        assert!(verify(json!({"add": ["a"], "subset_of": ["a", "b"]})).is_ok());
        assert!(verify(json!({"add": ["c"], "subset_of": ["a", "b"]})).is_err());
    }

    #[test]
    fn test_superset_must_be_within_subset() {
        assert!(verify(json!({"subset_of": ["a", "b"], "superset_of": ["a"]})).is_ok());
        assert!(verify(json!({"subset_of": ["a", "b"], "superset_of": ["c"]})).is_err());
    }

    #[test]
    fn test_value_checked_against_other_operators() {
        assert!(verify(json!({"value": "a", "one_of": ["a", "b"]})).is_ok());
        assert!(verify(json!({"value": "c", "one_of": ["a", "b"]})).is_err());
        assert!(verify(json!({"value": ["a"], "subset_of": ["a", "b"]})).is_ok());
        assert!(verify(json!({"value": ["a", "c"], "subset_of": ["a", "b"]})).is_err());
        assert!(verify(json!({"value": ["a"], "superset_of": ["a", "b"]})).is_err());
        assert!(verify(json!({"value": ["a", "b"], "add": ["b"]})).is_ok());
        assert!(verify(json!({"value": ["a"], "add": ["b"]})).is_err());
    }

    #[test]
    fn test_null_value_rules() {
        assert!(verify(json!({"value": null})).is_ok());
        assert!(verify(json!({"value": null, "default": "x"})).is_err());
        assert!(verify(json!({"value": null, "essential": true})).is_err());
        assert!(verify(json!({"value": null, "essential": false})).is_ok());
    }
}
