//! Dynamic field value type.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Field values of a single resource, keyed by field name.
///
/// A `BTreeMap` keeps iteration order stable, which makes diffs and
/// history digests deterministic.
pub type Fields = BTreeMap<String, Value>;

/// A dynamic field value.
///
/// Floats are intentionally not supported: every value has exact
/// equality, which the permission engine and the history diffs rely on.
/// Timestamps are stored as [`Value::Integer`] milliseconds since the
/// Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (supports full i64 range).
    Integer(i64),
    /// Text string (UTF-8).
    Text(String),
    /// Array of values.
    Array(Vec<Value>),
    /// Nested object with sorted keys.
    Map(BTreeMap<String, Value>),
    /// Byte string.
    Bytes(Vec<u8>),
}

impl Value {
    /// Builds a map value from key-value pairs.
    pub fn map<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Compares two values of the same scalar kind.
    ///
    /// Returns `None` for mixed kinds and for containers; callers treat an
    /// incomparable pair as a failed comparison.
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Returns a short name for this value's kind, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Text(_) => "text",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a string, if it is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Look up a key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Appends an unambiguous byte encoding of this value to `out`.
    ///
    /// Each value is written as a one-byte tag followed by its payload;
    /// variable-length payloads are length-prefixed (u64, big-endian).
    /// Equal values always produce equal bytes.
    pub fn write_canonical(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(0x00),
            Value::Bool(b) => {
                out.push(0x01);
                out.push(u8::from(*b));
            }
            Value::Integer(n) => {
                out.push(0x02);
                out.extend_from_slice(&n.to_be_bytes());
            }
            Value::Text(s) => {
                out.push(0x03);
                write_len_prefixed(out, s.as_bytes());
            }
            Value::Array(items) => {
                out.push(0x04);
                out.extend_from_slice(&(items.len() as u64).to_be_bytes());
                for item in items {
                    item.write_canonical(out);
                }
            }
            Value::Map(map) => {
                out.push(0x05);
                out.extend_from_slice(&(map.len() as u64).to_be_bytes());
                for (key, value) in map {
                    write_len_prefixed(out, key.as_bytes());
                    value.write_canonical(out);
                }
            }
            Value::Bytes(b) => {
                out.push(0x06);
                write_len_prefixed(out, b);
            }
        }
    }
}

fn write_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    out.extend_from_slice(bytes);
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_kind_comparison() {
        assert_eq!(
            Value::Integer(1).partial_compare(&Value::Integer(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::from("b").partial_compare(&Value::from("a")),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn mixed_kinds_are_incomparable() {
        assert_eq!(Value::Integer(1).partial_compare(&Value::from("1")), None);
        assert_eq!(Value::Null.partial_compare(&Value::Null), None);
    }

    #[test]
    fn value_accessors() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(true).is_null());

        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Integer(42).as_bool(), None);

        assert_eq!(Value::Integer(42).as_integer(), Some(42));
        assert_eq!(Value::from("42").as_integer(), None);

        assert_eq!(Value::from("hello").as_text(), Some("hello"));
    }

    #[test]
    fn map_get() {
        let map = Value::map([("name", Value::from("Alice")), ("age", Value::Integer(30))]);

        assert_eq!(map.get("name"), Some(&Value::from("Alice")));
        assert_eq!(map.get("age"), Some(&Value::Integer(30)));
        assert_eq!(map.get("missing"), None);
    }

    #[test]
    fn canonical_bytes_distinguish_kinds() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        Value::from("1").write_canonical(&mut a);
        Value::Integer(1).write_canonical(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn canonical_bytes_are_stable_for_maps() {
        let first = Value::map([("a", Value::Integer(1)), ("b", Value::Integer(2))]);
        let second = Value::map([("b", Value::Integer(2)), ("a", Value::Integer(1))]);

        let mut a = Vec::new();
        let mut b = Vec::new();
        first.write_canonical(&mut a);
        second.write_canonical(&mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn json_literals_deserialize_naturally() {
        let value: Value = serde_json::from_str(r#"{"status": "draft", "n": 3, "tags": ["a"], "x": null}"#)
            .unwrap();
        assert_eq!(value.get("status"), Some(&Value::from("draft")));
        assert_eq!(value.get("n"), Some(&Value::Integer(3)));
        assert_eq!(
            value.get("tags"),
            Some(&Value::Array(vec![Value::from("a")]))
        );
        assert_eq!(value.get("x"), Some(&Value::Null));
    }

    #[test]
    fn option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(5i64)), Value::Integer(5));
    }
}
