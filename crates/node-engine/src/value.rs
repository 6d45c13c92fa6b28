//! Runtime values carried by data ports

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::PortDataType;

/// A value flowing through a data connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Json(serde_json::Value),
}

impl Value {
    /// The port data type this value naturally belongs to
    ///
    /// `Null` has no natural type and reports `Any`.
    pub fn data_type(&self) -> PortDataType {
        match self {
            Value::Null => PortDataType::Any,
            Value::Bool(_) => PortDataType::Bool,
            Value::Byte(_) => PortDataType::Byte,
            Value::Short(_) => PortDataType::Short,
            Value::Int(_) => PortDataType::Int,
            Value::Long(_) => PortDataType::Long,
            Value::Float(_) => PortDataType::Float,
            Value::Double(_) => PortDataType::Double,
            Value::String(_) => PortDataType::String,
            Value::Json(_) => PortDataType::Json,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it is one of the numeric variants
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Byte(v) => Some(f64::from(*v)),
            Value::Short(v) => Some(f64::from(*v)),
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Integral view of the value; floats are accepted only when whole
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            Value::Float(_) | Value::Double(_) => {
                let f = self.as_f64()?;
                (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
                    .then_some(f as i64)
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Loose truthiness used by branching nodes
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty() && s != "false" && s != "0",
            Value::Json(json) => match json {
                serde_json::Value::Null => false,
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                serde_json::Value::String(s) => !s.is_empty() && s != "false" && s != "0",
                serde_json::Value::Array(a) => !a.is_empty(),
                serde_json::Value::Object(o) => !o.is_empty(),
            },
            numeric => numeric.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        }
    }

    /// JSON rendering of the value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Byte(v) => serde_json::json!(v),
            Value::Short(v) => serde_json::json!(v),
            Value::Int(v) => serde_json::json!(v),
            Value::Long(v) => serde_json::json!(v),
            // Non-finite floats have no JSON form and become null
            Value::Float(v) => serde_json::Number::from_f64(f64::from(*v))
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Json(json) => json.clone(),
        }
    }
}

/// Canonical string representation, used by the string fallback in coercion
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
            Value::Json(json) => write!(f, "{}", json),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
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

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}
