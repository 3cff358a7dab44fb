//! Copying between dynamic maps and typed record shapes.
//!
//! Handlers may return loosely-typed values (`serde_json::Value`, maps)
//! while still declaring a response schema. Before response validation the
//! copier rebuilds the value in the declared record's shape: known keys are
//! coerced to their field kinds, unknown keys are dropped, nested records
//! and lists are recursed into. Failures are reported as field errors and
//! surface as response validation failures.

use serde_json::{Map, Value};

use crate::coerce;
use crate::error::FieldError;
use crate::plan::{FieldKind, RecordPlan};

/// Builds an instance of `plan`'s record shape from a dynamic map.
pub fn copy_to_record(
    plan: &RecordPlan,
    map: &Map<String, Value>,
) -> Result<Value, Vec<FieldError>> {
    let mut errors = Vec::new();
    let copied = copy_record(plan, map, "", &mut errors);
    if errors.is_empty() {
        Ok(copied)
    } else {
        Err(errors)
    }
}

fn copy_record(
    plan: &RecordPlan,
    map: &Map<String, Value>,
    prefix: &str,
    errors: &mut Vec<FieldError>,
) -> Value {
    let mut out = Map::new();
    for field in plan.flat_fields() {
        if field.skip {
            continue;
        }
        let Some(value) = map.get(field.serde_name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let path = if prefix.is_empty() {
            field.serde_name.to_string()
        } else {
            format!("{}.{}", prefix, field.serde_name)
        };
        let copied = copy_value(value, &field.kind, &path, errors);
        out.insert(field.serde_name.to_string(), copied);
    }
    Value::Object(out)
}

fn copy_value(
    value: &Value,
    kind: &FieldKind,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Value {
    match (kind, value) {
        (FieldKind::Record(nested), Value::Object(map)) => {
            copy_record(nested.plan(), map, path, errors)
        }
        (FieldKind::Record(_), other) => {
            errors.push(FieldError::new(
                path,
                format!("expected object, got {}", json_kind(other)),
            ));
            other.clone()
        }
        (FieldKind::List(inner), Value::Array(items)) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let item_path = format!("{}[{}]", path, i);
                    copy_value(item, inner, &item_path, errors)
                })
                .collect(),
        ),
        _ => match coerce::from_value(value, kind) {
            Ok(coerced) => coerced,
            Err(e) => {
                errors.push(FieldError::new(path, e.message));
                value.clone()
            }
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::plan::FieldSpec;

    fn plan(fields: Vec<(&'static str, FieldKind)>) -> RecordPlan {
        let specs = fields
            .into_iter()
            .map(|(name, kind)| FieldSpec {
                name,
                serde_name: name,
                bind: None,
                rules: None,
                description: None,
                example: None,
                kind,
                optional: false,
                renamed: false,
                skip: false,
                flatten: false,
            })
            .collect();
        RecordPlan::build("Test".to_string(), false, specs)
    }

    #[test]
    fn test_known_keys_copied_and_coerced() {
        let plan = plan(vec![
            ("name", FieldKind::String),
            ("age", FieldKind::Integer),
        ]);
        let map = json!({"name": "Ana", "age": 29.7, "extra": true});
        let copied = copy_to_record(&plan, map.as_object().unwrap()).unwrap();
        assert_eq!(copied, json!({"name": "Ana", "age": 29}));
    }

    #[test]
    fn test_unknown_keys_dropped() {
        let plan = plan(vec![("name", FieldKind::String)]);
        let map = json!({"name": "Ana", "password_hash": "secret"});
        let copied = copy_to_record(&plan, map.as_object().unwrap()).unwrap();
        assert!(copied.get("password_hash").is_none());
    }

    #[test]
    fn test_type_mismatch_reports_field_error() {
        let plan = plan(vec![("age", FieldKind::Integer)]);
        let map = json!({"age": {"unexpected": true}});
        let errors = copy_to_record(&plan, map.as_object().unwrap()).unwrap_err();
        assert_eq!(errors[0].field, "age");
    }

    #[test]
    fn test_list_elements_coerced() {
        let plan = plan(vec![(
            "scores",
            FieldKind::List(Box::new(FieldKind::Integer)),
        )]);
        let map = json!({"scores": [1, 2.9, "3"]});
        let copied = copy_to_record(&plan, map.as_object().unwrap()).unwrap();
        assert_eq!(copied, json!({"scores": [1, 2, 3]}));
    }
}
