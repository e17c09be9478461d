//! Payload value coercion
//!
//! Scripting hosts hand over loosely typed values (numbers, text, sequences,
//! mappings). Transfers need bytes. [`Value::to_byte`] and
//! [`Value::to_bytes`] perform that conversion without touching the input.

use crate::error::{Result, UsbError};

/// A caller-supplied value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Text, coerced through its UTF-8 encoding
    Text(String),
    /// Raw byte string
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
    /// Key-value pairs in iteration order
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Coerce to a single byte.
    ///
    /// Numbers keep their low 8 bits, text its first UTF-8 code unit, sequences
    /// and mappings their first element (resp. first value), recursively.
    pub fn to_byte(&self) -> Result<u8> {
        match self {
            Value::Int(n) => Ok(*n as u8),
            Value::Text(s) => s
                .as_bytes()
                .first()
                .copied()
                .ok_or_else(|| UsbError::invalid_argument("empty text has no first byte")),
            Value::Bytes(b) => b
                .first()
                .copied()
                .ok_or_else(|| UsbError::invalid_argument("empty bytes have no first byte")),
            Value::Seq(items) => items
                .first()
                .ok_or_else(|| UsbError::invalid_argument("empty sequence has no first element"))?
                .to_byte(),
            Value::Map(entries) => entries
                .first()
                .ok_or_else(|| UsbError::invalid_argument("empty mapping has no first value"))?
                .1
                .to_byte(),
            other => Err(UsbError::invalid_argument(format!(
                "cannot convert {} to a byte",
                other.kind()
            ))),
        }
    }

    /// Coerce to a byte buffer.
    ///
    /// Text is copied verbatim (its byte length, not its character count).
    /// Sequences become one byte per element via [`Value::to_byte`]; the
    /// first element that fails aborts the whole conversion. Mappings are
    /// treated as the sequence of their values.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            Value::Bytes(b) => Ok(b.clone()),
            Value::Seq(items) => items.iter().map(Value::to_byte).collect(),
            Value::Map(entries) => entries.iter().map(|(_, v)| v.to_byte()).collect(),
            other => Err(UsbError::invalid_argument(format!(
                "cannot convert {} to a byte buffer",
                other.kind()
            ))),
        }
    }

    /// Short name of the value's shape, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "mapping",
        }
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Int(n as i64)
                }
            }
        )*
    };
}

impl_from_int!(u8, u16, u32, i8, i16, i32, i64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<i32>> for Value {
    fn from(items: Vec<i32>) -> Self {
        Value::Seq(items.into_iter().map(Value::from).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => match n.as_u64() {
                    Some(u) => Value::Int(u as i64),
                    None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
                },
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::Seq(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (Value::Text(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}
