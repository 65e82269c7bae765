//! Policy values
//!
//! Operator values and attribute values are either a bare scalar or a list.
//! Set operators treat a scalar as a single-element list; `value` and
//! `default` keep whatever shape the policy gives them.

use serde_json::Value as JsonValue;

/// A scalar-or-list value as seen by the policy operators
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A single JSON scalar (string, number, boolean or null)
    Scalar(JsonValue),
    /// An ordered list of JSON scalars without duplicates
    List(Vec<JsonValue>),
}

impl Value {
    /// Convert from JSON; arrays become lists, everything else a scalar
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Array(items) => Value::List(dedup(items.iter().cloned())),
            other => Value::Scalar(other.clone()),
        }
    }

    /// Convert back to JSON
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Scalar(v) => v.clone(),
            Value::List(items) => JsonValue::Array(items.clone()),
        }
    }

    /// Create a string scalar
    pub fn string(s: impl Into<String>) -> Self {
        Value::Scalar(JsonValue::String(s.into()))
    }

    /// Create a list of strings
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(dedup(items.into_iter().map(|s| JsonValue::String(s.into()))))
    }

    /// Elements, promoting a scalar to a single-element list
    pub fn items(&self) -> Vec<JsonValue> {
        match self {
            Value::Scalar(JsonValue::Null) => Vec::new(),
            Value::Scalar(v) => vec![v.clone()],
            Value::List(items) => items.clone(),
        }
    }

    /// Whether this is a JSON null scalar
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Scalar(JsonValue::Null))
    }

    /// Boolean content, if the value is a boolean scalar
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Scalar(JsonValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Zero-valued: null, empty string, or empty list
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Scalar(JsonValue::Null) => true,
            Value::Scalar(JsonValue::String(s)) => s.is_empty(),
            Value::Scalar(_) => false,
            Value::List(items) => items.is_empty(),
        }
    }

    /// Whether `item` is one of the elements
    pub fn contains(&self, item: &JsonValue) -> bool {
        self.items().iter().any(|v| v == item)
    }

    /// Whether every element of `other` is an element of `self`
    pub fn contains_all(&self, other: &Value) -> bool {
        let mine = self.items();
        other.items().iter().all(|v| mine.contains(v))
    }

    /// Set union, preserving the order of `self` then `other`
    pub fn union(&self, other: &Value) -> Value {
        Value::List(dedup(self.items().into_iter().chain(other.items())))
    }

    /// Set intersection, preserving the order of `self`
    pub fn intersection(&self, other: &Value) -> Value {
        let theirs = other.items();
        Value::List(
            self.items()
                .into_iter()
                .filter(|v| theirs.contains(v))
                .collect(),
        )
    }

    /// Equality where list order does not matter
    pub fn equivalent(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => a == b,
            (Value::List(_), Value::List(_)) => {
                self.contains_all(other) && other.contains_all(self)
            }
            // a one-element list and the bare scalar describe the same set
            (Value::Scalar(s), Value::List(items)) | (Value::List(items), Value::Scalar(s)) => {
                items.len() == 1 && &items[0] == s
            }
        }
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_json(&json)
    }
}

fn dedup(items: impl Iterator<Item = JsonValue>) -> Vec<JsonValue> {
    let mut out: Vec<JsonValue> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
