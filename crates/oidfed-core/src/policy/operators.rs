//! The standard metadata policy operators
//!
//! Each operator knows how to merge its own values from two superiors and
//! how to apply its value to an attribute. Checks for operator pairs that
//! can never hold together live in the verifiers, not here.

use std::sync::Arc;

use super::value::Value;
use super::PolicyError;

pub const VALUE: &str = "value";
pub const ADD: &str = "add";
pub const DEFAULT: &str = "default";
pub const ONE_OF: &str = "one_of";
pub const SUBSET_OF: &str = "subset_of";
pub const SUPERSET_OF: &str = "superset_of";
pub const ESSENTIAL: &str = "essential";

/// Fixed apply order: modifiers before checks
pub const OPERATOR_ORDER: [&str; 7] = [VALUE, ADD, DEFAULT, ONE_OF, SUBSET_OF, SUPERSET_OF, ESSENTIAL];

/// A metadata policy operator
pub trait PolicyOperator: Send + Sync {
    /// Operator name as it appears in `metadata_policy`
    fn name(&self) -> &str;

    /// Merge the value set by a superior with the one set by its subordinate
    fn merge(&self, parent: &Value, child: &Value, path: &str) -> Result<Value, PolicyError>;

    /// Apply the operator to an attribute
    ///
    /// `value` is `None` when the attribute is not set. Returns the new
    /// attribute state.
    fn apply(
        &self,
        value: Option<Value>,
        policy_value: &Value,
        essential: bool,
        path: &str,
    ) -> Result<Option<Value>, PolicyError>;

    /// Whether this operator may appear on the same attribute as `other`
    fn may_combine_with(&self, _other: &str) -> bool {
        true
    }
}

/// The seven standard operators in [`OPERATOR_ORDER`]
pub fn standard_operators() -> Vec<Arc<dyn PolicyOperator>> {
    vec![
        Arc::new(ValueOperator),
        Arc::new(AddOperator),
        Arc::new(DefaultOperator),
        Arc::new(OneOfOperator),
        Arc::new(SubsetOfOperator),
        Arc::new(SupersetOfOperator),
        Arc::new(EssentialOperator),
    ]
}

fn conflict(path: &str, operator: &str) -> PolicyError {
    PolicyError::Conflict {
        path: path.to_string(),
        operator: operator.to_string(),
    }
}

fn violation(path: &str, operator: &str, message: impl Into<String>) -> PolicyError {
    PolicyError::Violation {
        path: path.to_string(),
        operator: operator.to_string(),
        message: message.into(),
    }
}

fn equal_or_conflict(parent: &Value, child: &Value, path: &str, operator: &str) -> Result<Value, PolicyError> {
    if parent.equivalent(child) {
        Ok(parent.clone())
    } else {
        Err(conflict(path, operator))
    }
}

/// `value`: forces the attribute to the policy value; `null` removes it
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueOperator;

impl PolicyOperator for ValueOperator {
    fn name(&self) -> &str {
        VALUE
    }

    fn merge(&self, parent: &Value, child: &Value, path: &str) -> Result<Value, PolicyError> {
        equal_or_conflict(parent, child, path, VALUE)
    }

    fn apply(
        &self,
        _value: Option<Value>,
        policy_value: &Value,
        _essential: bool,
        _path: &str,
    ) -> Result<Option<Value>, PolicyError> {
        if policy_value.is_null() {
            return Ok(None);
        }
        Ok(Some(policy_value.clone()))
    }
}

/// `add`: unions the policy values into the attribute
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOperator;

impl PolicyOperator for AddOperator {
    fn name(&self) -> &str {
        ADD
    }

    fn merge(&self, parent: &Value, child: &Value, _path: &str) -> Result<Value, PolicyError> {
        Ok(parent.union(child))
    }

    fn apply(
        &self,
        value: Option<Value>,
        policy_value: &Value,
        _essential: bool,
        _path: &str,
    ) -> Result<Option<Value>, PolicyError> {
        match value {
            None => Ok(Some(policy_value.clone())),
            Some(current) => Ok(Some(current.union(policy_value))),
        }
    }

    fn may_combine_with(&self, other: &str) -> bool {
        other != ONE_OF
    }
}

/// `default`: fills the attribute when it is unset or empty
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOperator;

impl PolicyOperator for DefaultOperator {
    fn name(&self) -> &str {
        DEFAULT
    }

    fn merge(&self, parent: &Value, child: &Value, path: &str) -> Result<Value, PolicyError> {
        equal_or_conflict(parent, child, path, DEFAULT)
    }

    fn apply(
        &self,
        value: Option<Value>,
        policy_value: &Value,
        _essential: bool,
        _path: &str,
    ) -> Result<Option<Value>, PolicyError> {
        match value {
            Some(current) if !current.is_empty() => Ok(Some(current)),
            current if policy_value.is_null() => Ok(current),
            _ => Ok(Some(policy_value.clone())),
        }
    }
}

/// `one_of`: the attribute must be one of the listed values
#[derive(Debug, Clone, Copy, Default)]
pub struct OneOfOperator;

impl PolicyOperator for OneOfOperator {
    fn name(&self) -> &str {
        ONE_OF
    }

    fn merge(&self, parent: &Value, child: &Value, path: &str) -> Result<Value, PolicyError> {
        let merged = parent.intersection(child);
        if merged.is_empty() {
            return Err(conflict(path, ONE_OF));
        }
        Ok(merged)
    }

    fn apply(
        &self,
        value: Option<Value>,
        policy_value: &Value,
        _essential: bool,
        path: &str,
    ) -> Result<Option<Value>, PolicyError> {
        let Some(current) = value else {
            return Ok(None);
        };
        let items = current.items();
        match items.as_slice() {
            [single] if policy_value.contains(single) => Ok(Some(current)),
            [single] => Err(violation(path, ONE_OF, format!("{} is not an allowed value", single))),
            _ => Err(violation(path, ONE_OF, "attribute must hold a single value")),
        }
    }

    fn may_combine_with(&self, other: &str) -> bool {
        !matches!(other, ADD | SUBSET_OF | SUPERSET_OF)
    }
}

/// `subset_of`: the attribute is narrowed to the listed values
#[derive(Debug, Clone, Copy, Default)]
pub struct SubsetOfOperator;

impl PolicyOperator for SubsetOfOperator {
    fn name(&self) -> &str {
        SUBSET_OF
    }

    fn merge(&self, parent: &Value, child: &Value, _path: &str) -> Result<Value, PolicyError> {
        Ok(parent.intersection(child))
    }

    fn apply(
        &self,
        value: Option<Value>,
        policy_value: &Value,
        _essential: bool,
        _path: &str,
    ) -> Result<Option<Value>, PolicyError> {
        let Some(current) = value else {
            return Ok(None);
        };
        let narrowed = current.intersection(policy_value);
        if narrowed.is_empty() {
            return Ok(None);
        }
        match current {
            Value::Scalar(_) => Ok(Some(current)),
            Value::List(_) => Ok(Some(narrowed)),
        }
    }

    fn may_combine_with(&self, other: &str) -> bool {
        other != ONE_OF
    }
}

/// `superset_of`: the attribute must contain all listed values
#[derive(Debug, Clone, Copy, Default)]
pub struct SupersetOfOperator;

impl PolicyOperator for SupersetOfOperator {
    fn name(&self) -> &str {
        SUPERSET_OF
    }

    fn merge(&self, parent: &Value, child: &Value, _path: &str) -> Result<Value, PolicyError> {
        Ok(parent.union(child))
    }

    fn apply(
        &self,
        value: Option<Value>,
        policy_value: &Value,
        _essential: bool,
        path: &str,
    ) -> Result<Option<Value>, PolicyError> {
        let Some(current) = value else {
            return Ok(None);
        };
        if current.contains_all(policy_value) {
            Ok(Some(current))
        } else {
            Err(violation(path, SUPERSET_OF, "attribute is missing required values"))
        }
    }

    fn may_combine_with(&self, other: &str) -> bool {
        other != ONE_OF
    }
}

/// `essential`: the attribute must be present after all other operators
#[derive(Debug, Clone, Copy, Default)]
pub struct EssentialOperator;

fn essential_flag(value: &Value, path: &str) -> Result<bool, PolicyError> {
    value.as_bool().ok_or_else(|| PolicyError::InvalidOperatorValue {
        path: path.to_string(),
        operator: ESSENTIAL.to_string(),
        message: "expected a boolean".to_string(),
    })
}

impl PolicyOperator for EssentialOperator {
    fn name(&self) -> &str {
        ESSENTIAL
    }

    fn merge(&self, parent: &Value, child: &Value, path: &str) -> Result<Value, PolicyError> {
        let merged = essential_flag(parent, path)? || essential_flag(child, path)?;
        Ok(Value::Scalar(merged.into()))
    }

    fn apply(
        &self,
        value: Option<Value>,
        policy_value: &Value,
        _essential: bool,
        path: &str,
    ) -> Result<Option<Value>, PolicyError> {
        if essential_flag(policy_value, path)? && value.is_none() {
            return Err(violation(path, ESSENTIAL, "essential attribute is not set"));
        }
        Ok(value)
    }
}
