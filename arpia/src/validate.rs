//! Structural validation of records against their rule sets.
//!
//! A single shared [`Validator`] instance evaluates the rules from each
//! field's plan over the JSON representation of a record. Failures are
//! collected into a flat list of [`FieldError`]s with dotted paths, human
//! messages and the failing rule name as the tag.
//!
//! `email` and `url` delegate to the `validator` crate; everything else is
//! evaluated here. Custom predicates registered with [`Validator::register`]
//! must be safe to call in parallel; the instance is read-only once the
//! application starts serving.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use validator::{ValidateEmail, ValidateUrl};

use crate::error::FieldError;
use crate::plan::{FieldKind, FieldPlan, RecordPlan, Rule};

/// A user-registered predicate: receives the field value and the optional
/// `rule=param` parameter, returns whether the value passes.
pub type CustomRule = Arc<dyn Fn(&Value, Option<&str>) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct Validator {
    custom: HashMap<String, CustomRule>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom rule under `name`. Must happen before the app
    /// starts serving.
    pub fn register<F>(&mut self, name: impl Into<String>, rule: F)
    where
        F: Fn(&Value, Option<&str>) -> bool + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Arc::new(rule));
    }

    /// Validates `value` (the JSON form of a record) against `plan`.
    /// An empty result means the record passed.
    pub fn validate(&self, plan: &RecordPlan, value: &Value) -> Vec<FieldError> {
        let mut errors = Vec::new();
        self.validate_record(plan, value, "", &mut errors);
        errors
    }

    fn validate_record(
        &self,
        plan: &RecordPlan,
        value: &Value,
        prefix: &str,
        errors: &mut Vec<FieldError>,
    ) {
        let empty = serde_json::Map::new();
        let object = value.as_object().unwrap_or(&empty);
        for field in plan.flat_fields() {
            if field.skip {
                continue;
            }
            let path = join_path(prefix, field.serde_name);
            let field_value = object.get(field.serde_name);
            self.validate_field(field, field_value, &path, errors);
        }
    }

    fn validate_field(
        &self,
        field: &FieldPlan,
        value: Option<&Value>,
        path: &str,
        errors: &mut Vec<FieldError>,
    ) {
        let present = value.is_some_and(|v| !is_empty(v));
        if !present {
            if field.rules.iter().any(|r| matches!(r, Rule::Required)) {
                errors.push(FieldError::with_tag(path, "field is required", "required"));
            }
            return;
        }
        let value = value.unwrap_or(&Value::Null);

        // Nested records are validated recursively against their own plans.
        match (&field.kind, value) {
            (FieldKind::Record(nested), Value::Object(_)) => {
                self.validate_record(nested.plan(), value, path, errors);
            }
            (FieldKind::List(inner), Value::Array(items)) => {
                if let FieldKind::Record(nested) = inner.as_ref() {
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{}[{}]", path, i);
                        self.validate_record(nested.plan(), item, &item_path, errors);
                    }
                }
            }
            _ => {}
        }

        self.apply_rules(&field.rules, value, path, errors);
    }

    fn apply_rules(
        &self,
        rules: &[Rule],
        value: &Value,
        path: &str,
        errors: &mut Vec<FieldError>,
    ) {
        for (i, rule) in rules.iter().enumerate() {
            match rule {
                Rule::Required => {}
                Rule::Dive => {
                    // The rules after `dive` apply to each list element.
                    let rest = &rules[i + 1..];
                    if let Value::Array(items) = value {
                        for (j, item) in items.iter().enumerate() {
                            let item_path = format!("{}[{}]", path, j);
                            self.apply_rules(rest, item, &item_path, errors);
                        }
                    }
                    return;
                }
                _ => {
                    if let Some(error) = self.check(rule, value, path) {
                        errors.push(error);
                    }
                }
            }
        }
    }

    fn check(&self, rule: &Rule, value: &Value, path: &str) -> Option<FieldError> {
        let fail = |message: String| Some(FieldError::with_tag(path, message, rule.tag()));
        match rule {
            Rule::Required | Rule::Dive => None,
            Rule::Min(n) => match measure(value) {
                Some(m) if m < *n => fail(format!("must be at least {}", fmt_num(*n))),
                _ => None,
            },
            Rule::Max(n) => match measure(value) {
                Some(m) if m > *n => fail(format!("must be at most {}", fmt_num(*n))),
                _ => None,
            },
            Rule::Gte(n) => match value.as_f64() {
                Some(v) if v < *n => {
                    fail(format!("must be greater than or equal to {}", fmt_num(*n)))
                }
                _ => None,
            },
            Rule::Lte(n) => match value.as_f64() {
                Some(v) if v > *n => {
                    fail(format!("must be less than or equal to {}", fmt_num(*n)))
                }
                _ => None,
            },
            Rule::Email => match value.as_str() {
                Some(s) if s.validate_email() => None,
                Some(_) => fail("must be a valid email address".to_string()),
                None => fail("must be a string email address".to_string()),
            },
            Rule::Url => match value.as_str() {
                Some(s) if s.validate_url() => None,
                Some(_) => fail("must be a valid URL".to_string()),
                None => fail("must be a string URL".to_string()),
            },
            Rule::Alphanum => match value.as_str() {
                Some(s) if s.chars().all(|c| c.is_ascii_alphanumeric()) => None,
                _ => fail("must contain only alphanumeric characters".to_string()),
            },
            Rule::OneOf(allowed) => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return fail(format!("must be one of [{}]", allowed.join(" "))),
                };
                if allowed.iter().any(|a| a == &text) {
                    None
                } else {
                    fail(format!("must be one of [{}]", allowed.join(" ")))
                }
            }
            Rule::Custom { name, param } => match self.custom.get(name) {
                Some(predicate) if predicate(value, param.as_deref()) => None,
                Some(_) => fail(format!("failed rule {}", name)),
                // Unknown rules fail loudly rather than silently passing.
                None => fail(format!("unknown rule {}", name)),
            },
        }
    }
}

/// The magnitude `min`/`max` compare against: numeric value for numbers,
/// character count for strings, element count for lists.
fn measure(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => Some(s.chars().count() as f64),
        Value::Array(items) => Some(items.len() as f64),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
