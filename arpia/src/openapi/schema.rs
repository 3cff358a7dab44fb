//! Record plan to JSON Schema conversion.
//!
//! Two converters exist on purpose. The request converter only includes
//! body-bound fields (everything else is documented as a parameter) and
//! keys them by their wire key. The response converter includes every
//! non-skipped field and keys fields without an explicit rename by the
//! camelCase derivation of their name. Named schemas are registered once;
//! a second registration of the same name is a no-op. Generic
//! instantiations are always inlined to avoid cross-instantiation
//! collisions.

use std::collections::BTreeMap;

use crate::coerce;
use crate::plan::{FieldKind, FieldPlan, PlanRef, RecordPlan};

use super::Schema;

pub(crate) type SchemaRegistry = BTreeMap<String, Schema>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Mode {
    Request,
    Response,
}

/// Schema for a scalar or composite field, registering nested records as
/// needed.
pub(crate) fn kind_schema(kind: &FieldKind, registry: &mut SchemaRegistry, mode: Mode) -> Schema {
    match kind {
        FieldKind::String => Schema::typed("string"),
        FieldKind::Integer => Schema::typed("integer"),
        FieldKind::Float => Schema::typed("number"),
        FieldKind::Boolean => Schema::typed("boolean"),
        FieldKind::DateTime => Schema::with_format("string", "date-time"),
        FieldKind::Uuid => Schema::with_format("string", "uuid"),
        FieldKind::Any => Schema::typed("object"),
        FieldKind::List(inner) => {
            let mut schema = Schema::typed("array");
            schema.items = Some(Box::new(kind_schema(inner, registry, mode)));
            schema
        }
        FieldKind::Record(nested) => record_ref(*nested, registry, mode),
    }
}

/// `$ref` to a registered record schema, or the inline schema for generic
/// instantiations.
pub(crate) fn record_ref(
    plan_ref: PlanRef,
    registry: &mut SchemaRegistry,
    mode: Mode,
) -> Schema {
    let plan = plan_ref.plan();
    if plan.generic {
        return record_schema(plan, registry, mode);
    }
    register(plan, registry, mode);
    Schema::reference(&plan.name)
}

/// Registers `plan` under its sanitized name. No-op when already present.
pub(crate) fn register(plan: &RecordPlan, registry: &mut SchemaRegistry, mode: Mode) {
    if registry.contains_key(&plan.name) {
        return;
    }
    // Insert a placeholder first so self-referential records terminate.
    registry.insert(plan.name.clone(), Schema::default());
    let schema = record_schema(plan, registry, mode);
    registry.insert(plan.name.clone(), schema);
}

/// Inline object schema for a record, converted per `mode`.
pub(crate) fn record_schema(
    plan: &RecordPlan,
    registry: &mut SchemaRegistry,
    mode: Mode,
) -> Schema {
    let mut properties = BTreeMap::new();
    let mut required = Vec::new();
    for field in plan.flat_fields() {
        if field.skip {
            continue;
        }
        let key = match mode {
            // Parameters document non-body fields; they never appear in
            // the request body schema.
            Mode::Request => {
                if !field.is_body() {
                    continue;
                }
                field.key.clone()
            }
            Mode::Response => field.doc_key.clone(),
        };
        let mut schema = kind_schema(&field.kind, registry, mode);
        schema.description = field.description.map(String::from);
        schema.example = example_value(field);
        if field.required {
            required.push(key.clone());
        }
        properties.insert(key, schema);
    }
    let mut schema = Schema::typed("object");
    schema.properties = Some(properties);
    if !required.is_empty() {
        schema.required = Some(required);
    }
    schema
}

/// Example literals are coerced to the field's kind so numbers and
/// booleans are emitted natively; anything uncoercible stays a string.
pub(crate) fn example_value(field: &FieldPlan) -> Option<serde_json::Value> {
    let raw = field.example?;
    Some(
        coerce::from_str(raw, &field.kind)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string())),
    )
}
