//! Value Module
//!
//! Normalized field values and their on-disk encoding.
//!
//! ## Supported Values
//! - scalars: `i64`, `f64`, `bool`
//! - text: UTF-8, stored as an opaque byte sequence and decoded on read
//! - arrays: any [`DType`], any shape; homogeneous `Vec<T>` becomes a 1-d array
//!
//! ## Encoding
//! ```text
//! Int / Float  : 8 bytes little-endian
//! Bool         : 1 byte (0 or 1)
//! Text         : UTF-8 bytes
//! Array        : raw little-endian elements, row-major
//! ```

mod array;
mod dtype;

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StashError};

pub use array::Array;
pub(crate) use array::Window;
pub use dtype::{DType, Element};

/// Attribute map attached to a field
pub type Attrs = BTreeMap<String, Value>;

/// A single normalized field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Array(Array),
}

/// Type and layout of an encoded value (stored alongside the bytes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Float,
    Bool,
    Text,
    Array { dtype: DType, shape: Vec<usize> },
}

impl ValueKind {
    /// Shape of a value of this kind (scalars and text are 0-d)
    pub fn shape(&self) -> Vec<usize> {
        match self {
            ValueKind::Array { shape, .. } => shape.clone(),
            _ => Vec::new(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            ValueKind::Int => "int".to_string(),
            ValueKind::Float => "float".to_string(),
            ValueKind::Bool => "bool".to_string(),
            ValueKind::Text => "text".to_string(),
            ValueKind::Array { dtype, shape } => format!("array<{}>{:?}", dtype, shape),
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Text(_) => ValueKind::Text,
            Value::Array(a) => ValueKind::Array {
                dtype: a.dtype(),
                shape: a.shape().to_vec(),
            },
        }
    }

    /// Shape of the value (empty for scalars and text)
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Value::Array(a) => a.shape().to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Slice an array value; other kinds cannot be sliced
    pub fn slice(&self, ranges: &[std::ops::Range<usize>]) -> Result<Array> {
        match self {
            Value::Array(a) => a.slice(ranges),
            other => Err(StashError::TypeMismatch {
                expected: "array".to_string(),
                found: other.kind().name(),
            }),
        }
    }

    /// Encode to the on-disk byte form described by [`Value::kind`]
    pub fn encode(&self) -> Bytes {
        match self {
            Value::Int(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Value::Float(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Value::Bool(v) => Bytes::copy_from_slice(&[*v as u8]),
            Value::Text(v) => Bytes::copy_from_slice(v.as_bytes()),
            Value::Array(a) => a.raw().clone(),
        }
    }

    /// Decode bytes produced by [`Value::encode`]
    pub fn decode(kind: &ValueKind, data: Bytes) -> Result<Self> {
        let fixed = |len: usize| -> Result<[u8; 8]> {
            if data.len() != len {
                return Err(StashError::Corruption(format!(
                    "{} value needs {} bytes, got {}",
                    kind.name(),
                    len,
                    data.len()
                )));
            }
            let mut buf = [0u8; 8];
            buf[..len].copy_from_slice(&data);
            Ok(buf)
        };

        match kind {
            ValueKind::Int => Ok(Value::Int(i64::from_le_bytes(fixed(8)?))),
            ValueKind::Float => Ok(Value::Float(f64::from_le_bytes(fixed(8)?))),
            ValueKind::Bool => Ok(Value::Bool(fixed(1)?[0] != 0)),
            ValueKind::Text => {
                let text = String::from_utf8(data.to_vec()).map_err(|e| {
                    StashError::Corruption(format!("text value is not UTF-8: {}", e))
                })?;
                Ok(Value::Text(text))
            }
            ValueKind::Array { dtype, shape } => {
                Ok(Value::Array(Array::from_raw(*dtype, shape.clone(), data)?))
            }
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

/// Homogeneous sequences are normalized to 1-d arrays
impl<T: Element> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(Array::from_vec(v))
    }
}

impl<T: Element> From<&[T]> for Value {
    fn from(v: &[T]) -> Self {
        Value::Array(Array::from_vec(v.to_vec()))
    }
}
