//! Multi-source request extraction.
//!
//! [`bind`] builds the JSON form of an input record from the request:
//! the decoded body (POST/PUT/PATCH) merged with path, query, header,
//! cookie and form values per each field's plan, then deserializes it into
//! the typed record. Every failure is a single-field
//! [`Error::Parse`](crate::error::Error) naming the field and source.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::coerce;
use crate::context::RequestContext;
use crate::error::Error;
use crate::plan::{ApiType, DefaultValue, FieldPlan, RecordPlan, Source, plan_of};

/// Extracts `T` from the request. Returns the typed record together with
/// its composed JSON form, which the validator runs over.
pub fn bind<T: ApiType>(ctx: &RequestContext) -> Result<(T, Value), Error> {
    let plan = plan_of::<T>();
    let composed = compose(ctx, plan)?;
    let record: T = serde_json::from_value(composed.clone())
        .map_err(|e| Error::parse("body", Source::Body, e.to_string()))?;
    Ok((record, composed))
}

/// Builds the JSON object for `plan` from all request sources.
pub fn compose(ctx: &RequestContext, plan: &RecordPlan) -> Result<Value, Error> {
    let method = ctx.method();
    let body_allowed = matches!(
        method,
        &http::Method::POST | &http::Method::PUT | &http::Method::PATCH
    );

    let mut object = Map::new();
    let mut form: HashMap<String, String> = HashMap::new();

    if body_allowed {
        let content_type = ctx.header("content-type").unwrap_or_default().to_string();
        if content_type.starts_with("application/x-www-form-urlencoded") {
            form = serde_urlencoded::from_bytes(ctx.body()).map_err(|e| {
                Error::parse("body", Source::Form, format!("invalid form body: {}", e))
            })?;
        } else if content_type.contains("application/json") && ctx.body().is_empty() {
            return Err(Error::parse(
                "body",
                Source::Body,
                "body required for JSON",
            ));
        } else if !ctx.body().is_empty() {
            let decoded: Value = serde_json::from_slice(ctx.body()).map_err(|e| {
                Error::parse("body", Source::Body, format!("invalid JSON: {}", e))
            })?;
            match decoded {
                Value::Object(map) => object = map,
                other => {
                    return Err(Error::parse(
                        "body",
                        Source::Body,
                        format!("expected a JSON object, got {}", type_of(&other)),
                    ));
                }
            }
        }
    }

    fill_fields(ctx, plan, &form, &mut object)?;
    Ok(Value::Object(object))
}

fn fill_fields(
    ctx: &RequestContext,
    plan: &RecordPlan,
    form: &HashMap<String, String>,
    object: &mut Map<String, Value>,
) -> Result<(), Error> {
    for field in plan.flat_fields() {
        if field.skip {
            continue;
        }
        match field.source {
            Source::Body => {
                // Body values arrive keyed by whatever the client sent; a
                // bind key that differs from the serde name is re-keyed so
                // deserialization finds it.
                if field.key != field.serde_name {
                    if let Some(value) = object.remove(&field.key) {
                        object.insert(field.serde_name.to_string(), value);
                    }
                }
            }
            Source::Form => {
                let raw = form.get(&field.key).cloned().unwrap_or_default();
                apply_raw(field, raw, object)?;
            }
            Source::Auto if object.contains_key(field.serde_name) => {
                // Already satisfied by the decoded body; an explicit path
                // or query value still takes precedence, but absence is
                // not an error or a default here.
                let raw = ctx.raw_value(Source::Auto, &field.key).unwrap_or_default();
                if !raw.is_empty() {
                    let value = coerce::from_str(&raw, &field.kind).map_err(|e| {
                        Error::parse(field.serde_name, field.source, e.message)
                    })?;
                    object.insert(field.serde_name.to_string(), value);
                }
            }
            _ => {
                let raw = ctx
                    .raw_value(field.source, &field.key)
                    .unwrap_or_default();
                apply_raw(field, raw, object)?;
            }
        }
    }
    Ok(())
}

fn apply_raw(
    field: &FieldPlan,
    raw: String,
    object: &mut Map<String, Value>,
) -> Result<(), Error> {
    if raw.is_empty() {
        if field.required {
            return Err(Error::parse(
                field.serde_name,
                field.source,
                "field is required",
            ));
        }
        if let Some(default) = &field.default {
            let value = match default {
                DefaultValue::Coerced(v) => v.clone(),
                DefaultValue::Raw(raw) => coerce::from_str(raw, &field.kind)
                    .map_err(|e| Error::parse(field.serde_name, field.source, e.message))?,
            };
            object.insert(field.serde_name.to_string(), value);
        }
        return Ok(());
    }
    let value = coerce::from_str(&raw, &field.kind)
        .map_err(|e| Error::parse(field.serde_name, field.source, e.message))?;
    object.insert(field.serde_name.to_string(), value);
    Ok(())
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::context::PathParams;
    use crate::plan::{FieldKind, FieldSpec};
    use crate::state::AppState;
    use crate::validate::Validator;

    fn ctx(method: &str, uri: &str, headers: &[(&str, &str)], body: &str) -> RequestContext {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        RequestContext::new(
            parts,
            Bytes::from(body.to_string()),
            PathParams::new(),
            Arc::new(AppState::new()),
            Arc::new(Validator::new()),
        )
    }

    fn field(
        name: &'static str,
        bind: Option<&'static str>,
        kind: FieldKind,
    ) -> FieldSpec {
        FieldSpec {
            name,
            serde_name: name,
            bind,
            rules: None,
            description: None,
            example: None,
            kind,
            optional: false,
            renamed: false,
            skip: false,
            flatten: false,
        }
    }

    fn plan(specs: Vec<FieldSpec>) -> RecordPlan {
        RecordPlan::build("Test".to_string(), false, specs)
    }

    #[test]
    fn test_empty_json_body_on_post_is_parse_error() {
        let plan = plan(vec![field("email", None, FieldKind::String)]);
        let c = ctx("POST", "/x", &[("content-type", "application/json")], "");
        let err = compose(&c, &plan).unwrap_err();
        match err {
            Error::Parse { field, message, .. } => {
                assert_eq!(field, "body");
                assert_eq!(message, "body required for JSON");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json_body_names_body_field() {
        let plan = plan(vec![field("email", None, FieldKind::String)]);
        let c = ctx("POST", "/x", &[("content-type", "application/json")], "{nope");
        match compose(&c, &plan).unwrap_err() {
            Error::Parse { field, .. } => assert_eq!(field, "body"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_get_ignores_body_and_reads_query() {
        let plan = plan(vec![field(
            "name",
            Some("query:name"),
            FieldKind::String,
        )]);
        let c = ctx("GET", "/u?name=John", &[], "");
        let composed = compose(&c, &plan).unwrap();
        assert_eq!(composed, json!({"name": "John"}));
    }

    #[test]
    fn test_query_value_coerced_to_integer() {
        let plan = plan(vec![field(
            "limit",
            Some("query:limit"),
            FieldKind::Integer,
        )]);
        let c = ctx("GET", "/u?limit=25", &[], "");
        assert_eq!(compose(&c, &plan).unwrap(), json!({"limit": 25}));
    }

    #[test]
    fn test_coercion_failure_names_field_and_source() {
        let plan = plan(vec![field(
            "limit",
            Some("query:limit"),
            FieldKind::Integer,
        )]);
        let c = ctx("GET", "/u?limit=lots", &[], "");
        match compose(&c, &plan).unwrap_err() {
            Error::Parse { field, source, .. } => {
                assert_eq!(field, "limit");
                assert_eq!(source, Source::Query);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_required_missing_non_body_source_fails() {
        let plan = plan(vec![field(
            "api_key",
            Some("header:X-API-Key,required"),
            FieldKind::String,
        )]);
        let c = ctx("GET", "/u", &[], "");
        match compose(&c, &plan).unwrap_err() {
            Error::Parse { field, message, .. } => {
                assert_eq!(field, "api_key");
                assert_eq!(message, "field is required");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_default_substituted_when_empty() {
        let plan = plan(vec![field(
            "limit",
            Some("query:limit,default:20"),
            FieldKind::Integer,
        )]);
        let c = ctx("GET", "/u", &[], "");
        assert_eq!(compose(&c, &plan).unwrap(), json!({"limit": 20}));
    }

    #[test]
    fn test_unusable_default_surfaces_as_coercion_error() {
        let plan = plan(vec![field(
            "limit",
            Some("query:limit,default:lots"),
            FieldKind::Integer,
        )]);
        let c = ctx("GET", "/u", &[], "");
        assert!(matches!(
            compose(&c, &plan).unwrap_err(),
            Error::Parse { .. }
        ));
    }

    #[test]
    fn test_body_fields_pass_through_from_payload() {
        let plan = plan(vec![
            field("email", None, FieldKind::String),
            field("role", Some("query:role"), FieldKind::String),
        ]);
        let c = ctx(
            "POST",
            "/u?role=admin",
            &[("content-type", "application/json")],
            r#"{"email": "a@b.com"}"#,
        );
        assert_eq!(
            compose(&c, &plan).unwrap(),
            json!({"email": "a@b.com", "role": "admin"})
        );
    }

    #[test]
    fn test_body_bind_key_rekeyed_to_serde_name() {
        let mut spec = field("address", Some("body:addr"), FieldKind::String);
        spec.serde_name = "address";
        let plan = plan(vec![spec]);
        let c = ctx(
            "POST",
            "/u",
            &[("content-type", "application/json")],
            r#"{"addr": "main st"}"#,
        );
        assert_eq!(
            compose(&c, &plan).unwrap(),
            json!({"address": "main st"})
        );
    }

    #[test]
    fn test_form_body_source() {
        let plan = plan(vec![field("name", Some("form:name"), FieldKind::String)]);
        let c = ctx(
            "POST",
            "/u",
            &[("content-type", "application/x-www-form-urlencoded")],
            "name=Ana&extra=1",
        );
        assert_eq!(compose(&c, &plan).unwrap(), json!({"name": "Ana"}));
    }

    #[test]
    fn test_non_object_json_body_rejected() {
        let plan = plan(vec![field("email", None, FieldKind::String)]);
        let c = ctx(
            "POST",
            "/u",
            &[("content-type", "application/json")],
            r#"[1,2]"#,
        );
        assert!(matches!(
            compose(&c, &plan).unwrap_err(),
            Error::Parse { .. }
        ));
    }

    #[test]
    fn test_auto_field_prefers_query_over_body_value() {
        let plan = plan(vec![field("name", None, FieldKind::String)]);
        let c = ctx(
            "POST",
            "/u?name=FromQuery",
            &[("content-type", "application/json")],
            r#"{"name": "FromBody"}"#,
        );
        assert_eq!(
            compose(&c, &plan).unwrap(),
            json!({"name": "FromQuery"})
        );
    }
}
