mod encode;

use std::cmp::Ordering;
use std::fmt;

/// Type tag for non-null values stored in a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ValueType {
    Int64,
    Double,
    Varchar,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int64 => write!(f, "Integer"),
            ValueType::Double => write!(f, "Double"),
            ValueType::Varchar => write!(f, "Varchar"),
        }
    }
}

/// Tagged scalar. Arithmetic and comparison are only defined between values
/// of the same type; `Null` compares with nothing and propagates through
/// expressions as SQL unknown.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Null,
    Int64(i64),
    Double(f64),
    Varchar(String),
}

impl Value {
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(ValueType::Int64),
            Value::Double(_) => Some(ValueType::Double),
            Value::Varchar(_) => Some(ValueType::Varchar),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// SQL truthiness: non-null and not numerically zero / not empty string.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int64(v) => *v != 0,
            Value::Double(v) => *v != 0.0,
            Value::Varchar(s) => !s.is_empty(),
        }
    }

    /// Compare two values of the same type. Returns `None` when either side
    /// is null or the types differ; varchar ordering is byte-lexicographic.
    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Varchar(a), Value::Varchar(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v:?}"),
            Value::Varchar(s) => write!(f, "\"{s}\""),
        }
    }
}
