use crate::error::{FetchError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A comparable watermark value.
///
/// JSON numbers become `Integer` or `Float`. JSON strings that parse as
/// RFC 3339 become `Timestamp`, anything else stays `Text`. A composite
/// cursor (several fields read together) is a `Composite`.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorValue {
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
    Composite(Vec<CursorValue>),
}

impl CursorValue {
    /// Converts a JSON value. `null` yields `Ok(None)`.
    pub fn from_json(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Some(CursorValue::Integer(i))),
                None => n
                    .as_f64()
                    .map(|f| Some(CursorValue::Float(f)))
                    .ok_or_else(|| mismatch_json(value)),
            },
            Value::String(s) => Ok(Some(CursorValue::parse_text(s))),
            Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match CursorValue::from_json(item)? {
                        Some(part) => parts.push(part),
                        None => return Ok(None),
                    }
                }
                Ok(Some(CursorValue::Composite(parts)))
            }
            Value::Bool(_) | Value::Object(_) => Err(mismatch_json(value)),
        }
    }

    /// Reads a string as a timestamp when possible.
    pub fn parse_text(s: &str) -> Self {
        match DateTime::parse_from_rfc3339(s) {
            Ok(ts) => CursorValue::Timestamp(ts.with_timezone(&Utc)),
            Err(_) => CursorValue::Text(s.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CursorValue::Integer(i) => Value::from(*i),
            CursorValue::Float(f) => Value::from(*f),
            CursorValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            CursorValue::Text(s) => Value::String(s.clone()),
            CursorValue::Composite(parts) => {
                Value::Array(parts.iter().map(CursorValue::to_json).collect())
            }
        }
    }

    /// Natural ordering. Fails with `TypeMismatch` across kinds, except
    /// that integers and floats compare numerically.
    pub fn try_cmp(&self, other: &CursorValue) -> Result<Ordering> {
        use CursorValue::*;
        let ordering = match (self, other) {
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Composite(a), Composite(b)) if a.len() == b.len() => {
                for (left, right) in a.iter().zip(b) {
                    match left.try_cmp(right)? {
                        Ordering::Equal => continue,
                        unequal => return Ok(unequal),
                    }
                }
                Some(Ordering::Equal)
            }
            _ => None,
        };
        ordering.ok_or_else(|| FetchError::TypeMismatch {
            left: self.to_string(),
            right: other.to_string(),
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            CursorValue::Integer(_) => "integer",
            CursorValue::Float(_) => "float",
            CursorValue::Timestamp(_) => "timestamp",
            CursorValue::Text(_) => "text",
            CursorValue::Composite(_) => "composite",
        }
    }
}

fn mismatch_json(value: &Value) -> FetchError {
    FetchError::TypeMismatch {
        left: value.to_string(),
        right: "a cursor value (number, string or array)".to_string(),
    }
}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.to_json(), self.kind())
    }
}

impl From<i64> for CursorValue {
    fn from(value: i64) -> Self {
        CursorValue::Integer(value)
    }
}

impl From<i32> for CursorValue {
    fn from(value: i32) -> Self {
        CursorValue::Integer(value.into())
    }
}

impl From<f64> for CursorValue {
    fn from(value: f64) -> Self {
        CursorValue::Float(value)
    }
}

impl From<DateTime<Utc>> for CursorValue {
    fn from(value: DateTime<Utc>) -> Self {
        CursorValue::Timestamp(value)
    }
}

impl From<&str> for CursorValue {
    fn from(value: &str) -> Self {
        CursorValue::parse_text(value)
    }
}

impl From<String> for CursorValue {
    fn from(value: String) -> Self {
        CursorValue::parse_text(&value)
    }
}

impl Serialize for CursorValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CursorValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        CursorValue::from_json(&value)
            .map_err(serde::de::Error::custom)?
            .ok_or_else(|| serde::de::Error::custom("cursor value cannot be null"))
    }
}
