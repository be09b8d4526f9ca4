//! The record type that generators corrupt and targets consume.
//!
//! `serde_json::Value` cannot hold NaN, infinities, raw bytes or values that
//! refuse to serialize, and those are exactly the shapes a corruption harness
//! needs to produce. [`Value`] is a superset: it converts losslessly from JSON
//! and back whenever the content is representable.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::ChaosError;

/// A keyed/nested record.
///
/// Maps are ordered (`BTreeMap`) so seeded generators are reproducible.
/// Equality compares floats bit for bit: `NaN == NaN`, `0.0 != -0.0`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Float, including NaN and infinities.
    Float(f64),
    /// UTF-8 text.
    Str(String),
    /// Raw bytes, possibly invalid UTF-8.
    Bytes(Vec<u8>),
    /// Ordered list.
    List(Vec<Value>),
    /// Keyed map.
    Map(BTreeMap<String, Value>),
    /// A handle that cannot be serialized (function, socket, cyclic object).
    Opaque(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Build a map from key/value pairs.
    pub fn object<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Short name of the variant (for diagnostics and type-change mutations).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Opaque(_) => "opaque",
        }
    }

    /// True for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for lists and maps.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_))
    }

    /// Borrow the map, if this is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Mutably borrow the map, if this is one.
    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow the string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Look up a key in a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Look up a dotted path (`"status.code"`) through nested maps.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(self, |current, segment| current.get(segment))
    }

    /// Approximate in-memory payload size in bytes.
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Null | Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 8,
            Value::Str(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Opaque(s) => s.len(),
            Value::List(items) => items.iter().map(Value::approx_size).sum::<usize>() + 8,
            Value::Map(map) => {
                map.iter()
                    .map(|(k, v)| k.len() + v.approx_size())
                    .sum::<usize>()
                    + 8
            }
        }
    }

    /// Maximum container nesting depth (scalars are depth 0).
    pub fn depth(&self) -> usize {
        match self {
            Value::List(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
            Value::Map(map) => 1 + map.values().map(Value::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Convert to JSON.
    ///
    /// Fails on non-finite floats and opaque handles. Bytes become base64
    /// strings when valid UTF-8 is not guaranteed.
    pub fn to_json(&self) -> Result<serde_json::Value, ChaosError> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| ChaosError::NotSerializable(format!("non-finite float {f}")))?,
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_, _>>()?,
            ),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_, ChaosError>>()?,
            ),
            Value::Opaque(handle) => {
                return Err(ChaosError::NotSerializable(format!("opaque handle {handle}")))
            }
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "b64:{}", STANDARD.encode(b)),
            Value::List(items) => write!(f, "[{} items]", items.len()),
            Value::Map(map) => write!(f, "{{{} keys}}", map.len()),
            Value::Opaque(handle) => write!(f, "<opaque {handle}>"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Opaque(handle) => Err(S::Error::custom(format!(
                "opaque handle {handle} is not serializable"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_from_json() {
        let v = Value::from(json!({"a": 1, "b": [true, null], "c": {"d": "x"}}));
        assert_eq!(v.get("a"), Some(&Value::Int(1)));
        assert_eq!(v.get_path("c.d"), Some(&Value::Str("x".into())));
        assert_eq!(v.depth(), 2);
    }

    #[test]
    fn json_round_trip_for_representable_values() {
        let original = json!({"name": "span", "n": 3, "f": 1.5, "list": [1, 2]});
        let v = Value::from(original.clone());
        assert_eq!(v.to_json().unwrap(), original);
    }

    #[test]
    fn nan_and_opaque_are_not_json() {
        assert!(Value::Float(f64::NAN).to_json().is_err());
        assert!(Value::Opaque("fn".into()).to_json().is_err());
        let nested = Value::object([("handle", Value::Opaque("socket".into()))]);
        assert!(matches!(
            nested.to_json(),
            Err(ChaosError::NotSerializable(_))
        ));
    }

    #[test]
    fn serializing_opaque_fails() {
        let v = Value::object([("cb", Value::Opaque("callback".into()))]);
        assert!(serde_json::to_string(&v).is_err());
    }

    #[test]
    fn bytes_serialize_as_array() {
        let s = serde_json::to_string(&Value::Bytes(vec![0, 255])).unwrap();
        assert_eq!(s, "[0,255]");
    }

    #[test]
    fn approx_size_counts_payload() {
        let v = Value::object([("k", Value::Str("x".repeat(100)))]);
        assert!(v.approx_size() >= 101);
    }

    #[test]
    fn floats_compare_by_bits() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Float(1.0), Value::Int(1));
        let record = Value::object([("latency", Value::Float(f64::NAN))]);
        assert_eq!(record.clone(), record);
    }
}
