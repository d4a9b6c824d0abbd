//! The value model shared by the codec and command handlers.
//!
//! A [`Value`] is a tagged union over the ten wire kinds. Values have no
//! identity beyond their structure: equality is structural, and map entry
//! order is irrelevant. Coercions between kinds are total and lossy:
//! asking for an incompatible view yields the zero value of the target
//! type, never an error.

mod serde;

use num_bigint::BigInt;
use std::collections::HashMap;

/// The kind tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Nil,
    Bool,
    Int64,
    Float64,
    BigInt,
    String,
    Bytes,
    Error,
    Array,
    Map,
}

/// A protocol value.
///
/// `String` is UTF-8 text; `Bytes` is the binary-safe kind (encoded as a
/// verbatim frame on the RESP3 wire). `Error` text conventionally carries
/// an `ERR ` prefix for application errors; see [`Value::error`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    BigInt(BigInt),
    String(String),
    Bytes(Vec<u8>),
    Error(String),
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Bool(_) => Kind::Bool,
            Value::Int64(_) => Kind::Int64,
            Value::Float64(_) => Kind::Float64,
            Value::BigInt(_) => Kind::BigInt,
            Value::String(_) => Kind::String,
            Value::Bytes(_) => Kind::Bytes,
            Value::Error(_) => Kind::Error,
            Value::Array(_) => Kind::Array,
            Value::Map(_) => Kind::Map,
        }
    }

    pub fn is(&self, kind: Kind) -> bool {
        self.kind() == kind
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// An application error, framed with the conventional `ERR ` prefix.
    pub fn error(msg: impl AsRef<str>) -> Value {
        Value::Error(format!("ERR {}", msg.as_ref()))
    }

    /// An error with the text taken verbatim (for server-level prefixes
    /// such as `NOPROTO`).
    pub fn error_raw(msg: impl Into<String>) -> Value {
        Value::Error(msg.into())
    }

    /// Build an array from anything convertible to values.
    pub fn array<I>(items: I) -> Value
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Build a map from key/value pairs.
    pub fn map<K, V, I>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Textual view: strings as-is, numerics and booleans formatted,
    /// everything else empty.
    pub fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int64(i) => i.to_string(),
            Value::Float64(f) => f.to_string(),
            Value::BigInt(i) => i.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        }
    }

    pub fn to_i64(&self) -> i64 {
        match self {
            Value::Int64(i) => *i,
            Value::Float64(f) => *f as i64,
            Value::String(s) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Value::Float64(f) => *f,
            Value::Int64(i) => *i as f64,
            Value::String(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn to_f32(&self) -> f32 {
        self.to_f64() as f32
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int64(i) => *i != 0,
            _ => false,
        }
    }

    pub fn to_bigint(&self) -> BigInt {
        match self {
            Value::BigInt(i) => i.clone(),
            Value::Int64(i) => BigInt::from(*i),
            _ => BigInt::from(0),
        }
    }

    /// Binary view: bytes as-is, strings as their UTF-8 bytes, everything
    /// else empty.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Bytes(b) => b.clone(),
            Value::String(s) => s.as_bytes().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Sequence view. A map flattens to alternating keys and values.
    pub fn to_array(&self) -> Vec<Value> {
        match self {
            Value::Array(items) => items.clone(),
            Value::Map(map) => {
                let mut dest = Vec::with_capacity(map.len() * 2);
                for (k, v) in map {
                    dest.push(Value::String(k.clone()));
                    dest.push(v.clone());
                }
                dest
            }
            _ => Vec::new(),
        }
    }

    /// Mapping view. An even-length array pairs up into entries, with keys
    /// coerced through [`Value::to_text`]; anything else is empty.
    pub fn to_map(&self) -> HashMap<String, Value> {
        match self {
            Value::Map(map) => map.clone(),
            Value::Array(items) if items.len() % 2 == 0 => items
                .chunks(2)
                .map(|pair| (pair[0].to_text(), pair[1].clone()))
                .collect(),
            _ => HashMap::new(),
        }
    }

    /// The error text, if this value is an error.
    pub fn as_error(&self) -> Option<&str> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int64(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::Int64(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::Int64(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::Float64(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Value {
        Value::Bytes(v.to_vec())
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Value {
        Value::BigInt(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Value {
        Value::Array(v)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Value {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Value {
        v.map_or(Value::Nil, Into::into)
    }
}
