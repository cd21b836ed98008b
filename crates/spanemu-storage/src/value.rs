//! Column types, typed values, and rows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Declared type of a column.
///
/// `String`/`Bytes` carry an optional maximum length; `None` is `MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int64,
    Float64,
    String(Option<usize>),
    Bytes(Option<usize>),
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn len(max: &Option<usize>) -> String {
            max.map_or_else(|| "MAX".to_string(), |n| n.to_string())
        }
        match self {
            ColumnType::Bool => f.write_str("BOOL"),
            ColumnType::Int64 => f.write_str("INT64"),
            ColumnType::Float64 => f.write_str("FLOAT64"),
            ColumnType::String(max) => write!(f, "STRING({})", len(max)),
            ColumnType::Bytes(max) => write!(f, "BYTES({})", len(max)),
        }
    }
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    #[serde(with = "float_bits")]
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// FLOAT64 cells are stored as their IEEE-754 bit pattern so NaN and the
/// infinities survive row encoding.
mod float_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOL",
            Value::Int64(_) => "INT64",
            Value::Float64(_) => "FLOAT64",
            Value::String(_) => "STRING",
            Value::Bytes(_) => "BYTES",
        }
    }

    /// Convert this value to the declared column type.
    ///
    /// `NULL` passes through (nullability is checked by the caller).
    /// INT64 widens to FLOAT64, and decimal strings are accepted for
    /// INT64/FLOAT64 because JSON clients commonly send 64-bit integers
    /// as strings.
    pub fn coerce(self, column: &str, ty: ColumnType) -> StorageResult<Value> {
        let mismatch = |v: &Value| {
            StorageError::InvalidArgument(format!(
                "column {column} expects {ty}, got {}",
                v.type_name()
            ))
        };
        let value = match (self, ty) {
            (Value::Null, _) => Value::Null,
            (Value::Bool(b), ColumnType::Bool) => Value::Bool(b),
            (Value::Int64(i), ColumnType::Int64) => Value::Int64(i),
            (Value::Int64(i), ColumnType::Float64) => Value::Float64(i as f64),
            (Value::Float64(x), ColumnType::Float64) => Value::Float64(x),
            (Value::String(s), ColumnType::Int64) => match s.parse::<i64>() {
                Ok(i) => Value::Int64(i),
                Err(_) => return Err(mismatch(&Value::String(s))),
            },
            (Value::String(s), ColumnType::Float64) => match s.parse::<f64>() {
                Ok(x) => Value::Float64(x),
                Err(_) => return Err(mismatch(&Value::String(s))),
            },
            (Value::String(s), ColumnType::String(max)) => {
                if let Some(max) = max {
                    let len = s.chars().count();
                    if len > max {
                        return Err(StorageError::InvalidArgument(format!(
                            "value for column {column} has length {len}, exceeding STRING({max})"
                        )));
                    }
                }
                Value::String(s)
            }
            (Value::Bytes(b), ColumnType::Bytes(max)) => {
                if let Some(max) = max {
                    if b.len() > max {
                        return Err(StorageError::InvalidArgument(format!(
                            "value for column {column} has length {}, exceeding BYTES({max})",
                            b.len()
                        )));
                    }
                }
                Value::Bytes(b)
            }
            (other, _) => return Err(mismatch(&other)),
        };
        Ok(value)
    }

    /// Best-effort conversion from an untyped JSON value.
    ///
    /// An array of integers in `0..=255` is BYTES, the same shape
    /// [`Value::to_json`] emits. Column types are applied afterwards by
    /// [`Value::coerce`].
    pub fn from_json(json: &serde_json::Value) -> StorageResult<Value> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Int64(i))
                } else if let Some(x) = n.as_f64() {
                    Ok(Value::Float64(x))
                } else {
                    Err(StorageError::InvalidArgument(format!("unsupported number {n}")))
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| {
                            StorageError::InvalidArgument(format!(
                                "BYTES element {item} is not in 0..=255"
                            ))
                        })
                })
                .collect::<StorageResult<Vec<u8>>>()
                .map(Value::Bytes),
            other => Err(StorageError::InvalidArgument(format!(
                "unsupported JSON value {other}"
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int64(i) => serde_json::Value::from(*i),
            Value::Float64(x) if x.is_nan() => serde_json::Value::from("NaN"),
            Value::Float64(x) if x.is_infinite() => {
                serde_json::Value::from(if *x > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Float64(x) => serde_json::Value::from(*x),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
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
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A projected result row; values follow the requested column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_i64(&self, index: usize) -> Option<i64> {
        match self.values.get(index)? {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn get_str(&self, index: usize) -> Option<&str> {
        match self.values.get(index)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
