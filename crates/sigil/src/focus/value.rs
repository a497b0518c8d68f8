//! A JSON-like document type with structural sharing.
//!
//! Aggregates live behind `Rc`, so cloning a [`Value`] is cheap and a
//! path-rebuild (see the focus lens) shares every subtree it does not
//! touch. Conversions to and from `serde_json::Value` make it easy to
//! construct documents with `serde_json::json!` and to hand them to
//! anything that speaks JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use sigil_core::ShallowEq;

use super::path::{self, Segment};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Map(Rc<BTreeMap<String, Value>>),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Rc::new(items.into_iter().collect()))
    }

    pub fn map(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Self {
        Value::Map(Rc::new(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        ))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Child at one path segment.
    pub fn get(&self, segment: &Segment) -> Option<&Value> {
        match (self, segment) {
            (Value::Map(map), Segment::Key(key)) => map.get(key),
            (Value::List(list), Segment::Index(index)) => list.get(*index),
            _ => None,
        }
    }

    /// Value at a dot path, if every step exists.
    pub fn at(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path::parse(path) {
            current = current.get(&segment)?;
        }
        Some(current)
    }

    /// Rebuild this node with `child` at `segment`. Siblings are shared,
    /// not copied: only the containing aggregate is recreated. A node that
    /// is not a container of the segment's shape is replaced by a fresh one
    /// (numeric segment makes a list, anything else a map).
    pub fn with_child(&self, segment: &Segment, child: Value) -> Value {
        match (self, segment) {
            (Value::Map(map), Segment::Key(key)) => {
                let mut next = (**map).clone();
                next.insert(key.clone(), child);
                Value::Map(Rc::new(next))
            }
            (Value::List(list), Segment::Index(index)) => {
                let mut next = (**list).clone();
                if *index >= next.len() {
                    next.resize(*index + 1, Value::Null);
                }
                next[*index] = child;
                Value::List(Rc::new(next))
            }
            (_, Segment::Key(key)) => {
                let mut next = BTreeMap::new();
                next.insert(key.clone(), child);
                Value::Map(Rc::new(next))
            }
            (_, Segment::Index(index)) => {
                let mut next = vec![Value::Null; *index];
                next.push(child);
                Value::List(Rc::new(next))
            }
        }
    }

    /// Pointer identity of aggregate payloads. Two values answer true only
    /// when they share the same backing allocation, which is how tests
    /// observe structural sharing.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Identity is scalar equality for leaves and allocation identity for
/// aggregates; shallow compares one level of keys/length with element-wise
/// identity and never recurses. Deep equality is the derived `PartialEq`.
impl ShallowEq for Value {
    fn identity_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| x.identity_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, x)| b.get(key).is_some_and(|y| x.identity_eq(y)))
            }
            _ => self.identity_eq(other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Num(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::str(s)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::Str(Rc::from(s.as_str())),
            serde_json::Value::Array(items) => {
                Value::List(Rc::new(items.into_iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(map) => Value::Map(Rc::new(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            )),
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Num(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::Value::from(self))
    }
}
