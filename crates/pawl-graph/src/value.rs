//! The argument value model shared by condition trees, function specs, and the
//! persistent scope.
//!
//! `Value` is deliberately small: the set of shapes that survive JSON
//! serialization unchanged. Anything richer travels through the transient scope
//! as an opaque entry and never crosses a persistence or network boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static argument maps attached to conditions, functions, and registers.
pub type ArgMap = BTreeMap<String, Value>;

/// A serializable scope or argument value.
///
/// Serializes untagged, so the JSON form is the natural one: `null`, booleans,
/// numbers, strings, arrays, objects. Integers are tried before floats on
/// deserialization, so `3` comes back as `Int(3)` and `3.5` as `Float(3.5)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_untagged() {
        assert_eq!(serde_json::to_string(&Value::Null).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Value::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Value::Int(-3)).unwrap(), "-3");
        assert_eq!(
            serde_json::to_string(&Value::from("hi")).unwrap(),
            "\"hi\""
        );
        let list = Value::List(vec![Value::Int(1), Value::from("two")]);
        assert_eq!(serde_json::to_string(&list).unwrap(), r#"[1,"two"]"#);
    }

    #[test]
    fn deserializes_int_before_float() {
        let n: Value = serde_json::from_str("3").unwrap();
        assert_eq!(n, Value::Int(3));
        let f: Value = serde_json::from_str("3.5").unwrap();
        assert_eq!(f, Value::Float(3.5));
    }

    #[test]
    fn map_roundtrip_is_sorted() {
        let mut entries = BTreeMap::new();
        entries.insert("zeta".to_owned(), Value::Int(1));
        entries.insert("alpha".to_owned(), Value::Bool(false));
        let v = Value::Map(entries);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"alpha":false,"zeta":1}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn accessors_match_variants() {
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(9).as_int(), Some(9));
        assert_eq!(Value::from("s").as_str(), Some("s"));
        assert_eq!(Value::Int(9).as_str(), None);
        assert!(Value::Null.is_null());
        assert_eq!(Value::Float(0.5).as_float(), Some(0.5));
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::Int(0).kind(), "int");
        assert_eq!(Value::List(vec![]).kind(), "list");
    }
}
