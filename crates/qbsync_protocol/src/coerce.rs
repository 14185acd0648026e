//! Conversion of loosely-typed JSON values into typed record fields.
//!
//! The coercion rule for integer fields:
//! - JSON integers are accepted when they fit the target width.
//! - Finite floating-point values are truncated toward zero and accepted when
//!   the truncated value fits the target width.
//! - Anything else is rejected and the field is left unchanged.
//!
//! Boolean fields also accept the integers `0` and `1`. Float fields accept
//! any JSON number. String fields accept only JSON strings.

use serde_json::Value;
use thiserror::Error;

/// Why a wire value could not be converted into a field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoerceError {
    /// The JSON type does not match the field type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// Expected JSON kind.
        expected: &'static str,
        /// Actual JSON kind.
        found: &'static str,
    },

    /// A number that does not fit the field width.
    #[error("value out of range")]
    OutOfRange,
}

/// A field type that can be read out of a JSON value.
pub trait FromWire: Sized {
    /// Converts a wire value, or explains why it cannot be used.
    fn from_wire(value: &Value) -> Result<Self, CoerceError>;
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(expected: &'static str, found: &Value) -> CoerceError {
    CoerceError::TypeMismatch {
        expected,
        found: kind(found),
    }
}

// 2^64; any truncated float below this in magnitude converts to i128 exactly.
const INTEGRAL_LIMIT: f64 = 18_446_744_073_709_551_616.0;

fn integral(value: &Value) -> Result<i128, CoerceError> {
    let Value::Number(n) = value else {
        return Err(mismatch("number", value));
    };
    if let Some(i) = n.as_i64() {
        return Ok(i128::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(i128::from(u));
    }
    let f = n.as_f64().ok_or(CoerceError::OutOfRange)?;
    let truncated = f.trunc();
    if !truncated.is_finite() || truncated.abs() >= INTEGRAL_LIMIT {
        return Err(CoerceError::OutOfRange);
    }
    Ok(truncated as i128)
}

impl FromWire for i64 {
    fn from_wire(value: &Value) -> Result<Self, CoerceError> {
        i64::try_from(integral(value)?).map_err(|_| CoerceError::OutOfRange)
    }
}

impl FromWire for i32 {
    fn from_wire(value: &Value) -> Result<Self, CoerceError> {
        i32::try_from(integral(value)?).map_err(|_| CoerceError::OutOfRange)
    }
}

impl FromWire for u64 {
    fn from_wire(value: &Value) -> Result<Self, CoerceError> {
        u64::try_from(integral(value)?).map_err(|_| CoerceError::OutOfRange)
    }
}

impl FromWire for f64 {
    fn from_wire(value: &Value) -> Result<Self, CoerceError> {
        match value {
            Value::Number(n) => n.as_f64().ok_or(CoerceError::OutOfRange),
            other => Err(mismatch("number", other)),
        }
    }
}

impl FromWire for bool {
    fn from_wire(value: &Value) -> Result<Self, CoerceError> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => match n.as_u64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(CoerceError::OutOfRange),
            },
            other => Err(mismatch("boolean", other)),
        }
    }
}

impl FromWire for String {
    fn from_wire(value: &Value) -> Result<Self, CoerceError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(mismatch("string", other)),
        }
    }
}

impl FromWire for Vec<String> {
    fn from_wire(value: &Value) -> Result<Self, CoerceError> {
        let Value::Array(items) = value else {
            return Err(mismatch("array", value));
        };
        items.iter().map(String::from_wire).collect()
    }
}
