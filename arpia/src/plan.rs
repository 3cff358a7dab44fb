//! Field binding plans derived from `#[derive(ApiType)]` records.
//!
//! Every record that participates in request binding or documentation is
//! described by a [`RecordPlan`]: an ordered list of [`FieldPlan`]s resolved
//! from the `#[bind(...)]` / `#[validate(...)]` / `#[serde(...)]` attributes
//! the derive macro captured. Plans are built once per type, on first use,
//! and cached for the life of the process; request handling only ever reads
//! a cached plan.
//!
//! The bind annotation grammar is `source:key[,required][,default:literal]`,
//! with `source` one of `body`, `query`, `path`, `header`, `cookie`, `form`
//! or `auto`.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::coerce;

/// Where a field's value is drawn from at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Decoded request payload.
    Body,
    /// Query-string parameter.
    Query,
    /// Named path parameter.
    Path,
    /// HTTP header.
    Header,
    /// Cookie value.
    Cookie,
    /// Field of a form-encoded body.
    Form,
    /// Tries path, then query. Never falls back to the decoded body;
    /// body keys are merged before the field walk runs.
    Auto,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Body => "body",
            Source::Query => "query",
            Source::Path => "path",
            Source::Header => "header",
            Source::Cookie => "cookie",
            Source::Form => "form",
            Source::Auto => "auto",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "body" => Some(Source::Body),
            "query" => Some(Source::Query),
            "path" => Some(Source::Path),
            "header" => Some(Source::Header),
            "cookie" => Some(Source::Cookie),
            "form" => Some(Source::Form),
            "auto" => Some(Source::Auto),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static shape of a field, as seen by the derive macro.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    /// `chrono` timestamps; documented as `string` / `date-time`.
    DateTime,
    Uuid,
    /// `serde_json::Value`, documented as a free-form object.
    Any,
    List(Box<FieldKind>),
    Record(PlanRef),
}

/// A late-bound reference to another record's plan.
///
/// Holds monomorphized function pointers so plans can reference each other
/// without forcing eager construction (nested plans are only built when a
/// route actually touches them).
#[derive(Clone, Copy)]
pub struct PlanRef {
    plan: fn() -> &'static RecordPlan,
}

impl PlanRef {
    pub fn of<T: ApiType>() -> Self {
        Self {
            plan: plan_of::<T>,
        }
    }

    pub fn plan(&self) -> &'static RecordPlan {
        (self.plan)()
    }
}

impl fmt::Debug for PlanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanRef").finish_non_exhaustive()
    }
}

/// A single validation rule parsed from a `#[validate("...")]` list.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required,
    Min(f64),
    Max(f64),
    Gte(f64),
    Lte(f64),
    Email,
    Url,
    Alphanum,
    OneOf(Vec<String>),
    /// Apply the remaining rules to each element of a list value.
    Dive,
    Custom { name: String, param: Option<String> },
}

impl Rule {
    /// The tag reported in [`FieldError::tag`](crate::error::FieldError)
    /// when this rule fails.
    pub fn tag(&self) -> &str {
        match self {
            Rule::Required => "required",
            Rule::Min(_) => "min",
            Rule::Max(_) => "max",
            Rule::Gte(_) => "gte",
            Rule::Lte(_) => "lte",
            Rule::Email => "email",
            Rule::Url => "url",
            Rule::Alphanum => "alphanum",
            Rule::OneOf(_) => "oneof",
            Rule::Dive => "dive",
            Rule::Custom { name, .. } => name,
        }
    }
}

/// A default literal from a bind annotation.
///
/// The literal is coerced to the field's kind when the plan is built. When
/// that coercion fails the raw string is retained and surfaces as a
/// coercion error if the default is ever applied.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Coerced(Value),
    Raw(String),
}

/// Raw per-field data emitted by `#[derive(ApiType)]`.
///
/// This is the macro's output format; [`FieldPlan::build`] normalizes it.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Rust field identifier.
    pub name: &'static str,
    /// The key serde actually uses on the wire (after renames).
    pub serde_name: &'static str,
    /// Raw bind annotation, if any.
    pub bind: Option<&'static str>,
    /// Raw validation rule list, if any.
    pub rules: Option<&'static str>,
    pub description: Option<&'static str>,
    pub example: Option<&'static str>,
    pub kind: FieldKind,
    /// The field was declared `Option<..>`.
    pub optional: bool,
    /// An explicit serde rename (field-level or struct-level) exists.
    pub renamed: bool,
    /// serde skips this field; it never appears in schemas.
    pub skip: bool,
    /// `#[serde(flatten)]`: the sub-record's fields contribute at this level.
    pub flatten: bool,
}

/// Normalized binding plan for one field.
#[derive(Debug, Clone)]
pub struct FieldPlan {
    pub name: &'static str,
    pub serde_name: &'static str,
    pub source: Source,
    /// Key used on the wire for the field's source.
    pub key: String,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub rules: Vec<Rule>,
    pub description: Option<&'static str>,
    pub example: Option<&'static str>,
    pub kind: FieldKind,
    pub optional: bool,
    pub renamed: bool,
    pub skip: bool,
    pub flatten: bool,
    /// Whether a `#[bind(...)]` annotation was written out.
    pub explicit_bind: bool,
    /// Key the response schema converter documents this field under.
    pub doc_key: String,
}

impl FieldPlan {
    /// Normalizes a [`FieldSpec`] per the bind annotation rules.
    ///
    /// Panics on a malformed annotation; plans are built during route
    /// registration, where misdeclared records are fatal.
    pub fn build(spec: FieldSpec) -> Self {
        let rules = parse_rules(spec.rules.unwrap_or(""));
        let (source, key, bind_required, default_lit, explicit_bind) = match spec.bind {
            Some(raw) => {
                let bind = parse_bind(raw).unwrap_or_else(|msg| {
                    panic!("invalid bind annotation on field `{}`: {}", spec.name, msg)
                });
                let key = bind.key.unwrap_or_else(|| spec.serde_name.to_string());
                (bind.source, key, bind.required, bind.default, true)
            }
            None => (
                Source::Auto,
                spec.serde_name.to_string(),
                false,
                None,
                false,
            ),
        };
        let required = bind_required || rules.iter().any(|r| matches!(r, Rule::Required));
        let default = default_lit.map(|lit| match coerce::from_str(&lit, &spec.kind) {
            Ok(v) => DefaultValue::Coerced(v),
            Err(_) => DefaultValue::Raw(lit),
        });
        let doc_key = if spec.renamed {
            spec.serde_name.to_string()
        } else {
            lower_camel(spec.name)
        };
        Self {
            name: spec.name,
            serde_name: spec.serde_name,
            source,
            key,
            required,
            default,
            rules,
            description: spec.description,
            example: spec.example,
            kind: spec.kind,
            optional: spec.optional,
            renamed: spec.renamed,
            skip: spec.skip,
            flatten: spec.flatten,
            explicit_bind,
            doc_key,
        }
    }

    /// True when the field belongs in the request body schema rather than
    /// the parameter list: bound to `body` explicitly, bound to `form`
    /// (encoded bodies), or carrying no bind annotation at all.
    pub fn is_body(&self) -> bool {
        matches!(self.source, Source::Body | Source::Form) || !self.explicit_bind
    }

    /// True when the field is documented as an operation parameter.
    pub fn is_parameter(&self) -> bool {
        self.explicit_bind
            && matches!(
                self.source,
                Source::Path | Source::Query | Source::Header | Source::Cookie | Source::Auto
            )
    }
}

/// Ordered, immutable binding plan for a record type.
#[derive(Debug, Clone)]
pub struct RecordPlan {
    /// Sanitized schema name, generic arguments included.
    pub name: String,
    /// Generic instantiations are inlined in documents instead of `$ref`ed.
    pub generic: bool,
    pub fields: Vec<FieldPlan>,
}

impl RecordPlan {
    pub fn build(name: String, generic: bool, specs: Vec<FieldSpec>) -> Self {
        Self {
            name: sanitize_name(&name),
            generic,
            fields: specs.into_iter().map(FieldPlan::build).collect(),
        }
    }

    /// Fields in declaration order, with flattened sub-records expanded
    /// in place so their fields contribute at this level.
    pub fn flat_fields(&self) -> Vec<&FieldPlan> {
        let mut out = Vec::new();
        self.collect_flat(&mut out);
        out
    }

    fn collect_flat<'a>(&'a self, out: &mut Vec<&'a FieldPlan>) {
        for field in &self.fields {
            match (&field.kind, field.flatten) {
                (FieldKind::Record(nested), true) => nested.plan().collect_flat(out),
                _ => out.push(field),
            }
        }
    }
}

/// A record type usable as a request or response schema.
///
/// Implemented via `#[derive(ApiType)]` from `arpia-macros`; the derive
/// reads field attributes and emits [`FieldSpec`]s, which the runtime turns
/// into one cached [`RecordPlan`] per type.
pub trait ApiType: DeserializeOwned + Serialize + Send + 'static {
    /// Bare type name, without generic arguments.
    fn base_name() -> &'static str;

    /// Schema registry name. Generic instantiations append the argument
    /// type names: `Page<User>` becomes `Page_User`.
    fn schema_name() -> String {
        Self::base_name().to_string()
    }

    fn is_generic() -> bool {
        false
    }

    fn field_specs() -> Vec<FieldSpec>;
}

/// Returns the cached plan for `T`, building it on first use.
pub fn plan_of<T: ApiType>() -> &'static RecordPlan {
    static PLANS: OnceLock<RwLock<HashMap<TypeId, &'static RecordPlan>>> = OnceLock::new();
    let registry = PLANS.get_or_init(|| RwLock::new(HashMap::new()));
    let key = TypeId::of::<T>();
    if let Some(plan) = registry.read().unwrap_or_else(|e| e.into_inner()).get(&key) {
        return plan;
    }
    let mut map = registry.write().unwrap_or_else(|e| e.into_inner());
    map.entry(key).or_insert_with(|| {
        Box::leak(Box::new(RecordPlan::build(
            T::schema_name(),
            T::is_generic(),
            T::field_specs(),
        )))
    })
}

struct ParsedBind {
    source: Source,
    key: Option<String>,
    required: bool,
    default: Option<String>,
}

/// Parses `source:key[,required][,default:literal]`.
fn parse_bind(raw: &str) -> Result<ParsedBind, String> {
    let mut segments = raw.split(',');
    let head = segments.next().unwrap_or("").trim();
    let (source_str, key) = match head.split_once(':') {
        Some((s, k)) => (s.trim(), Some(k.trim().to_string()).filter(|k| !k.is_empty())),
        None => (head, None),
    };
    let source = Source::parse(source_str)
        .ok_or_else(|| format!("unknown source `{}`", source_str))?;

    let mut required = false;
    let mut default = None;
    for segment in segments {
        let segment = segment.trim();
        if segment == "required" {
            required = true;
        } else if let Some(literal) = segment.strip_prefix("default:") {
            default = Some(literal.to_string());
        } else if !segment.is_empty() {
            return Err(format!("unknown bind option `{}`", segment));
        }
    }
    Ok(ParsedBind {
        source,
        key,
        required,
        default,
    })
}

/// Parses a comma-separated rule list, e.g. `required,min=6,oneof=admin user`.
pub fn parse_rules(raw: &str) -> Vec<Rule> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|token| {
            let (name, param) = match token.split_once('=') {
                Some((n, p)) => (n, Some(p)),
                None => (token, None),
            };
            let number = || {
                param
                    .and_then(|p| p.parse::<f64>().ok())
                    .unwrap_or_else(|| panic!("rule `{}` requires a numeric parameter", name))
            };
            match name {
                "required" => Rule::Required,
                "min" => Rule::Min(number()),
                "max" => Rule::Max(number()),
                "gte" => Rule::Gte(number()),
                "lte" => Rule::Lte(number()),
                "email" => Rule::Email,
                "url" => Rule::Url,
                "alphanum" => Rule::Alphanum,
                "oneof" => Rule::OneOf(
                    param
                        .unwrap_or("")
                        .split_whitespace()
                        .map(String::from)
                        .collect(),
                ),
                "dive" => Rule::Dive,
                other => Rule::Custom {
                    name: other.to_string(),
                    param: param.map(String::from),
                },
            }
        })
        .collect()
}

const ACRONYMS: &[&str] = &["API", "HTTP", "URL", "ID", "JSON"];

/// Lower-first-letter camelCase derivation used by the response schema
/// converter when a field carries no explicit rename. Leading all-caps
/// acronyms are normalized to lowercase as a prefix: `APIKey` -> `apiKey`,
/// `api_key` -> `apiKey`.
pub fn lower_camel(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    if name.contains('_') {
        let mut out = String::new();
        for (i, part) in name.split('_').filter(|p| !p.is_empty()).enumerate() {
            if i == 0 {
                out.push_str(&part.to_lowercase());
            } else {
                let mut chars = part.chars();
                if let Some(first) = chars.next() {
                    out.extend(first.to_uppercase());
                    out.push_str(chars.as_str());
                }
            }
        }
        return out;
    }
    for acronym in ACRONYMS {
        if let Some(rest) = name.strip_prefix(acronym) {
            return format!("{}{}", acronym.to_lowercase(), rest);
        }
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_lowercase(), chars.as_str()),
        None => String::new(),
    }
}

/// Restricts a schema name to `[A-Za-z0-9_]`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
