//! Value coercion across data connections
//!
//! When a consuming node reads an input, the cached output of the source is
//! converted to the input's declared type. Attempts run in a fixed order and
//! the first success wins:
//!
//! 1. The value already has the target type (or the target is open)
//! 2. Both sides are numeric: checked numeric conversion
//! 3. A converter registered for the exact (source, target) pair
//! 4. The target is `String`: the value's canonical string form
//!
//! Converters live in an explicit table rather than being discovered at
//! runtime, so the set of supported conversions is fixed and auditable.

use std::collections::HashMap;

use crate::types::PortDataType;
use crate::value::Value;

/// A registered conversion between two concrete types
///
/// Returns `None` when the particular value cannot be converted.
pub type ConverterFn = fn(&Value) -> Option<Value>;

/// Table of conversions consulted by [`ConverterRegistry::try_convert`]
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    converters: HashMap<(PortDataType, PortDataType), ConverterFn>,
}

impl ConverterRegistry {
    /// Create a registry with no custom converters
    ///
    /// Identity, numeric and string conversions are always available.
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Create a registry with the standard JSON bridging converters
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for scalar in [
            PortDataType::Bool,
            PortDataType::Byte,
            PortDataType::Short,
            PortDataType::Int,
            PortDataType::Long,
            PortDataType::Float,
            PortDataType::Double,
            PortDataType::String,
        ] {
            registry.register(scalar, PortDataType::Json, scalar_to_json);
        }
        registry.register(PortDataType::Json, PortDataType::Double, json_to_double);
        registry.register(PortDataType::Json, PortDataType::Long, json_to_long);
        registry.register(PortDataType::Json, PortDataType::Bool, json_to_bool);
        registry.register(PortDataType::Json, PortDataType::String, json_to_string);
        registry
    }

    /// Register (or replace) the converter for a type pair
    pub fn register(&mut self, from: PortDataType, to: PortDataType, converter: ConverterFn) {
        self.converters.insert((from, to), converter);
    }

    /// Whether a custom converter exists for the pair
    pub fn has_converter(&self, from: PortDataType, to: PortDataType) -> bool {
        self.converters.contains_key(&(from, to))
    }

    /// Attempt to convert `value` to `target`
    ///
    /// Never panics on bad input; every failure is reported as `None`.
    pub fn try_convert(&self, value: &Value, target: PortDataType) -> Option<Value> {
        let source = value.data_type();

        if target == PortDataType::Any || source == target {
            return Some(value.clone());
        }
        if value.is_null() {
            return (target == PortDataType::Json).then(|| Value::Json(serde_json::Value::Null));
        }

        if source.is_numeric() && target.is_numeric() {
            if let Some(converted) = convert_numeric(value, target) {
                return Some(converted);
            }
        }

        if let Some(converter) = self.converters.get(&(source, target)) {
            if let Some(converted) = converter(value) {
                return Some(converted);
            }
        }

        if target == PortDataType::String {
            return Some(Value::String(value.to_string()));
        }

        None
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Checked conversion between numeric variants
///
/// Floats converted to integers round to the nearest value, ties to even.
/// Out-of-range and non-finite values fail.
fn convert_numeric(value: &Value, target: PortDataType) -> Option<Value> {
    let integral = match value {
        Value::Float(_) | Value::Double(_) => {
            let f = value.as_f64()?;
            if !f.is_finite() {
                None
            } else {
                let rounded = f.round_ties_even();
                (rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64).then_some(rounded as i64)
            }
        }
        other => other.as_i64(),
    };

    match target {
        PortDataType::Byte => u8::try_from(integral?).ok().map(Value::Byte),
        PortDataType::Short => i16::try_from(integral?).ok().map(Value::Short),
        PortDataType::Int => i32::try_from(integral?).ok().map(Value::Int),
        PortDataType::Long => integral.map(Value::Long),
        PortDataType::Float => {
            let f = value.as_f64()?;
            let narrowed = f as f32;
            (narrowed.is_finite() || !f.is_finite()).then_some(Value::Float(narrowed))
        }
        PortDataType::Double => value.as_f64().map(Value::Double),
        _ => None,
    }
}

fn scalar_to_json(value: &Value) -> Option<Value> {
    Some(Value::Json(value.to_json()))
}

fn json_to_double(value: &Value) -> Option<Value> {
    match value {
        Value::Json(serde_json::Value::Number(n)) => n.as_f64().map(Value::Double),
        _ => None,
    }
}

fn json_to_long(value: &Value) -> Option<Value> {
    match value {
        Value::Json(serde_json::Value::Number(n)) => n.as_i64().map(Value::Long),
        _ => None,
    }
}

fn json_to_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Json(serde_json::Value::Bool(b)) => Some(Value::Bool(*b)),
        _ => None,
    }
}

fn json_to_string(value: &Value) -> Option<Value> {
    match value {
        Value::Json(serde_json::Value::String(s)) => Some(Value::String(s.clone())),
        _ => None,
    }
}
