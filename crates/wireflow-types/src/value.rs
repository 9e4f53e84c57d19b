//! The dynamic value tree that flows between nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A map of string keys to [`Value`]s. Backed by a `BTreeMap` for
/// deterministic, key-sorted serialization; nothing in the data model
/// depends on the iteration order of a value's own fields (unlike the
/// node/connection maps on [`crate::Workflow`], which are order-sensitive —
/// see [`crate::workflow::Workflow`]).
pub type ValueMap = BTreeMap<String, Value>;

/// JSON-compatible runtime payload flowing between nodes, with one addition:
/// [`Value::Bytes`] is a first-class variant (not a sidecar attachment) so
/// the embedding node can produce raw vectors without a separate binary
/// channel. Bytes are base64-encoded only at the response boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Raw bytes. Never produced by JSON deserialization (there is no wire
    /// representation distinguishing it from `String`); constructed only by
    /// executors that generate binary data, e.g. the embedding node.
    #[serde(skip_deserializing)]
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Object(ValueMap),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn object() -> Self {
        Value::Object(ValueMap::new())
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ValueMap> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by the `filter`-style boolean coercions in condition
    /// handling: mirrors the source's "falsy" set (null, false, zero,
    /// empty string/array).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Render as the string the original value would stringify to, used by
    /// placeholder substitution.
    pub fn stringify(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
        }
    }

    /// Convert to `serde_json::Value`, base64-encoding any byte string —
    /// this is the response-boundary coercion §6 requires.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(n) => serde_json::Value::Number((*n).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                b,
            )),
            Value::Array(a) => serde_json::Value::Array(a.iter().map(Value::to_json).collect()),
            Value::Object(m) => {
                serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }

    pub fn from_json(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::Array(a.into_iter().map(Value::from_json).collect()),
            serde_json::Value::Object(m) => {
                Value::Object(m.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<ValueMap> for Value {
    fn from(v: ValueMap) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_falsy_set() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::String("0".into()).is_truthy());
        assert!(Value::Object(ValueMap::new()).is_truthy());
    }

    #[test]
    fn bytes_round_trip_to_json_as_base64() {
        let v = Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        let json = v.to_json();
        assert_eq!(json, serde_json::Value::String("3q2+7w==".to_string()));
    }

    #[test]
    fn from_json_orders_fields_deterministically() {
        let json = serde_json::json!({"b": 1, "a": 2});
        let v = Value::from_json(json);
        let keys: Vec<&String> = v.as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
