//! String and value coercion into field kinds.
//!
//! Non-body sources (query, path, header, cookie, form) only ever yield
//! strings; [`from_str`] turns them into typed JSON values according to the
//! field's [`FieldKind`]. [`from_value`] does the same for already-decoded
//! JSON values and is used when applying defaults and when copying map
//! responses back into record shape.

use chrono::DateTime;
use serde_json::{Number, Value, json};

use crate::plan::FieldKind;

/// A single coercion failure, reported as a `ParseError` by the extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct CoerceError {
    pub message: String,
}

impl CoerceError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Coerces a raw string into the JSON value a field of `kind` expects.
///
/// Booleans accept `true` and `1` as true and anything else as false, so
/// they never fail. Lists split on commas and coerce element-wise.
pub fn from_str(raw: &str, kind: &FieldKind) -> Result<Value, CoerceError> {
    match kind {
        FieldKind::String => Ok(Value::String(raw.to_string())),
        FieldKind::Integer => raw
            .parse::<i64>()
            .map(|n| json!(n))
            .map_err(|_| CoerceError::new(format!("`{}` is not a valid integer", raw))),
        FieldKind::Float => raw
            .parse::<f64>()
            .map(|n| json!(n))
            .map_err(|_| CoerceError::new(format!("`{}` is not a valid number", raw))),
        FieldKind::Boolean => Ok(Value::Bool(raw == "true" || raw == "1")),
        FieldKind::DateTime => DateTime::parse_from_rfc3339(raw)
            .map(|_| Value::String(raw.to_string()))
            .map_err(|_| CoerceError::new(format!("`{}` is not a valid RFC 3339 timestamp", raw))),
        FieldKind::Uuid => uuid::Uuid::parse_str(raw)
            .map(|_| Value::String(raw.to_string()))
            .map_err(|_| CoerceError::new(format!("`{}` is not a valid UUID", raw))),
        FieldKind::Any => Ok(Value::String(raw.to_string())),
        FieldKind::List(inner) => raw
            .split(',')
            .map(|part| from_str(part.trim(), inner))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        FieldKind::Record(_) => Err(CoerceError::new(
            "record values cannot be read from a string source",
        )),
    }
}

/// Coerces a decoded JSON value into the shape a field of `kind` expects.
///
/// Integers truncate JSON numbers toward zero. An unsupported value kind
/// is a coercion error.
pub fn from_value(value: &Value, kind: &FieldKind) -> Result<Value, CoerceError> {
    match kind {
        FieldKind::String | FieldKind::DateTime | FieldKind::Uuid => match value {
            Value::String(_) => Ok(value.clone()),
            other => Err(unsupported(other, "string")),
        },
        FieldKind::Integer => match value {
            Value::Number(n) => {
                let truncated = n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                    .ok_or_else(|| unsupported(value, "integer"))?;
                Ok(json!(truncated))
            }
            Value::String(s) => from_str(s, &FieldKind::Integer),
            other => Err(unsupported(other, "integer")),
        },
        FieldKind::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| unsupported(value, "number")),
            Value::String(s) => from_str(s, &FieldKind::Float),
            other => Err(unsupported(other, "number")),
        },
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => Ok(Value::Bool(s == "true" || s == "1")),
            other => Err(unsupported(other, "boolean")),
        },
        FieldKind::Any => Ok(value.clone()),
        FieldKind::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| from_value(item, inner))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(unsupported(other, "array")),
        },
        FieldKind::Record(_) => match value {
            Value::Object(_) => Ok(value.clone()),
            other => Err(unsupported(other, "object")),
        },
    }
}

fn unsupported(value: &Value, wanted: &str) -> CoerceError {
    CoerceError::new(format!("expected {}, got {}", wanted, kind_name(value)))
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
