//! Purpose: Dynamic value model and the type classifier that anchors validation and ordering.
//! Exports: `Value`, `Callable`, `TypeTag`, `classify`.
//! Role: Foundation for schema checks, snapshot tagging, and query-time type decisions.
//! Invariants: `classify` is total over `Value`; numbers split into number/NaN/Infinity.
//! Invariants: Tag names are stable; they are persisted inside snapshots.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    #[serde(rename = "undefined")]
    Undefined,
    #[serde(rename = "bigint")]
    BigInt,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "symbol")]
    Symbol,
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "NaN")]
    NaN,
    #[serde(rename = "Infinity")]
    Infinity,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "null")]
    Null,
    #[serde(rename = "array")]
    Array,
}

impl TypeTag {
    pub const ALL: [TypeTag; 12] = [
        TypeTag::Undefined,
        TypeTag::BigInt,
        TypeTag::Boolean,
        TypeTag::String,
        TypeTag::Symbol,
        TypeTag::Function,
        TypeTag::Number,
        TypeTag::NaN,
        TypeTag::Infinity,
        TypeTag::Object,
        TypeTag::Null,
        TypeTag::Array,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Undefined => "undefined",
            TypeTag::BigInt => "bigint",
            TypeTag::Boolean => "boolean",
            TypeTag::String => "string",
            TypeTag::Symbol => "symbol",
            TypeTag::Function => "function",
            TypeTag::Number => "number",
            TypeTag::NaN => "NaN",
            TypeTag::Infinity => "Infinity",
            TypeTag::Object => "object",
            TypeTag::Null => "null",
            TypeTag::Array => "array",
        }
    }

    /// Tags whose values aggregate as numbers.
    pub fn is_numeric(self) -> bool {
        matches!(self, TypeTag::Number | TypeTag::BigInt)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| {
                Error::new(ErrorKind::UnknownType).with_message(format!("unknown type tag \"{s}\""))
            })
    }
}

/// A callable value. Classifies as `function` and is never storable.
#[derive(Clone)]
pub struct Callable {
    name: String,
    func: Arc<dyn Fn(&[Value]) -> Value + Send + Sync>,
}

impl Callable {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("name", &self.name).finish()
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    String(String),
    Symbol(String),
    Function(Callable),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

pub fn classify(value: &Value) -> TypeTag {
    match value {
        Value::Undefined => TypeTag::Undefined,
        Value::Null => TypeTag::Null,
        Value::Bool(_) => TypeTag::Boolean,
        Value::Number(n) if n.is_nan() => TypeTag::NaN,
        Value::Number(n) if n.is_infinite() => TypeTag::Infinity,
        Value::Number(_) => TypeTag::Number,
        Value::BigInt(_) => TypeTag::BigInt,
        Value::String(_) => TypeTag::String,
        Value::Symbol(_) => TypeTag::Symbol,
        Value::Function(_) => TypeTag::Function,
        Value::Array(_) => TypeTag::Array,
        Value::Object(_) => TypeTag::Object,
    }
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        classify(self)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of `Number` and `BigInt`; bigints widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::BigInt(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// True when a callable appears anywhere inside this value.
    pub fn contains_callable(&self) -> bool {
        match self {
            Value::Function(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_callable),
            Value::Object(map) => map.values().any(Value::contains_callable),
            _ => false,
        }
    }

    /// Lossy JSON view for display. Sentinels become strings, callables and undefined become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Number(n) if n.is_finite() => json!(n),
            Value::Number(n) => json!(format_number(*n)),
            Value::BigInt(n) => json!(n.to_string()),
            Value::String(s) | Value::Symbol(s) => json!(s),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Undefined => 0,
            Value::Null => 1,
            Value::Bool(_) => 2,
            Value::Number(_) | Value::BigInt(_) => 3,
            Value::String(_) => 4,
            Value::Symbol(_) => 5,
            Value::Array(_) => 6,
            Value::Object(_) => 7,
            Value::Function(_) => 8,
        }
    }

    /// Total order used by sorting. Values of one kind use their natural order;
    /// booleans order `true` first.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => b.cmp(a),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::BigInt(a), Value::BigInt(b)) => a.cmp(b),
            (Value::Number(a), Value::BigInt(b)) => a.total_cmp(&(*b as f64)),
            (Value::BigInt(a), Value::Number(b)) => (*a as f64).total_cmp(b),
            (Value::String(a), Value::String(b)) | (Value::Symbol(a), Value::Symbol(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.sort_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        n.to_string()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) | (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::BigInt(n) => write!(f, "{n}n"),
            Value::String(s) => write!(f, "{s}"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Function(c) => write!(f, "[function {}]", c.name()),
            Value::Array(_) | Value::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i128> for Value {
    fn from(value: i128) -> Self {
        Value::BigInt(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Object(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
