//! Turns registered routes into an OpenAPI document.

use std::collections::BTreeMap;

use http::Method;

use crate::plan::{PlanRef, Source};

use super::schema::{self, Mode, SchemaRegistry};
use super::{
    Components, Info, MediaType, OpenApi, OpenApiConfig, Operation, Parameter, PathItem,
    RequestBody, ResponseObject, Schema, SecurityScheme,
};

/// Everything the document needs to know about one registered route.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    /// `None` documents the route under every verb.
    pub method: Option<Method>,
    /// Route path in registration syntax (`/users/:user_id`).
    pub path: String,
    pub request: Option<PlanRef>,
    pub response: Option<PlanRef>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Accumulates route descriptors and builds the final document.
#[derive(Debug, Clone)]
pub struct DocBuilder {
    config: OpenApiConfig,
    descriptors: Vec<RouteDescriptor>,
}

const ALL_VERBS: &[Method] = &[
    Method::GET,
    Method::PUT,
    Method::POST,
    Method::DELETE,
    Method::OPTIONS,
    Method::HEAD,
    Method::PATCH,
];

impl DocBuilder {
    pub fn new(config: OpenApiConfig) -> Self {
        Self {
            config,
            descriptors: Vec::new(),
        }
    }

    pub fn push(&mut self, descriptor: RouteDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[RouteDescriptor] {
        &self.descriptors
    }

    pub fn build(&self) -> OpenApi {
        let mut schemas = SchemaRegistry::new();
        let mut security_schemes = BTreeMap::new();
        let mut paths: BTreeMap<String, PathItem> = BTreeMap::new();

        for descriptor in &self.descriptors {
            let doc_path = openapi_path(&descriptor.path);
            let verbs: Vec<Method> = match &descriptor.method {
                Some(method) => vec![method.clone()],
                None => ALL_VERBS.to_vec(),
            };
            for verb in verbs {
                let operation = self.operation(
                    descriptor,
                    &verb,
                    &mut schemas,
                    &mut security_schemes,
                );
                paths.entry(doc_path.clone()).or_default().set(&verb, operation);
            }
        }

        OpenApi {
            openapi: "3.0.0".to_string(),
            info: Info {
                title: self.config.title.clone(),
                description: self.config.description.clone(),
                version: self.config.version.clone(),
                contact: self.config.contact.clone(),
                license: self.config.license.clone(),
            },
            servers: self.config.servers.clone(),
            paths,
            components: Components {
                schemas,
                security_schemes,
            },
        }
    }

    fn operation(
        &self,
        descriptor: &RouteDescriptor,
        verb: &Method,
        schemas: &mut SchemaRegistry,
        security_schemes: &mut BTreeMap<String, SecurityScheme>,
    ) -> Operation {
        let mut operation = Operation {
            tags: descriptor.tags.clone(),
            description: descriptor.description.clone(),
            operation_id: operation_id(verb, &descriptor.path),
            ..Operation::default()
        };

        if let Some(request) = &descriptor.request {
            let plan = request.plan();
            let mut has_body_field = false;
            let mut has_form_field = false;
            let mut body_required = false;
            for field in plan.flat_fields() {
                if field.skip {
                    continue;
                }
                if field.is_body() {
                    has_body_field = true;
                    has_form_field |= field.source == Source::Form;
                    body_required |= field.required;
                    continue;
                }
                if !field.is_parameter() {
                    continue;
                }
                if field.source == Source::Header
                    && field.key.eq_ignore_ascii_case("authorization")
                {
                    // Bearer tokens are documented as a security requirement,
                    // not a header parameter.
                    if operation.security.is_empty() {
                        let mut requirement = BTreeMap::new();
                        requirement.insert("bearerAuth".to_string(), Vec::new());
                        operation.security.push(requirement);
                    }
                    security_schemes
                        .entry("bearerAuth".to_string())
                        .or_insert_with(SecurityScheme::bearer);
                    continue;
                }
                let location = match field.source {
                    Source::Path => "path",
                    Source::Header => "header",
                    Source::Cookie => "cookie",
                    // Auto binds resolve from the path map first, but the
                    // route decides whether the name is a path segment, so
                    // they are documented as query parameters.
                    Source::Query | Source::Auto => "query",
                    Source::Body | Source::Form => unreachable!(),
                };
                operation.parameters.push(Parameter {
                    name: field.key.clone(),
                    location: location.to_string(),
                    description: field.description.map(String::from),
                    required: field.source == Source::Path || field.required,
                    schema: schema::kind_schema(&field.kind, schemas, Mode::Request),
                    example: schema::example_value(field),
                });
            }

            if has_body_field && body_verb(verb) {
                let body_schema = if plan.generic {
                    schema::record_schema(plan, schemas, Mode::Request)
                } else {
                    schema::register(plan, schemas, Mode::Request);
                    Schema::reference(&plan.name)
                };
                // Form-bound fields are decoded from urlencoded bodies, so
                // records containing any are documented under that media
                // type instead of JSON.
                let content_type = if has_form_field {
                    "application/x-www-form-urlencoded"
                } else {
                    "application/json"
                };
                let mut content = BTreeMap::new();
                content.insert(
                    content_type.to_string(),
                    MediaType { schema: body_schema },
                );
                operation.request_body = Some(RequestBody {
                    required: body_required,
                    content,
                });
            }
        }

        match &descriptor.response {
            Some(response) => {
                let body = schema::record_ref(*response, schemas, Mode::Response);
                operation
                    .responses
                    .insert("200".to_string(), ResponseObject::json("OK", body));
            }
            None => {
                operation
                    .responses
                    .insert("200".to_string(), ResponseObject::plain("OK"));
            }
        }
        operation
            .responses
            .insert("400".to_string(), ResponseObject::plain("Bad Request"));
        operation.responses.insert(
            "500".to_string(),
            ResponseObject::plain("Internal Server Error"),
        );

        operation
    }
}

/// `/users/:user_id` -> `/users/{user_id}`.
pub(crate) fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// `POST /auth/login` -> `post_auth_login`; the root path maps to
/// `<verb>_root`.
pub(crate) fn operation_id(method: &Method, path: &str) -> String {
    let cleaned: String = path
        .trim_matches('/')
        .chars()
        .filter(|c| *c != ':')
        .map(|c| if c == '/' { '_' } else { c })
        .collect();
    let suffix = if cleaned.is_empty() {
        "root".to_string()
    } else {
        crate::plan::sanitize_name(&cleaned)
    };
    format!("{}_{}", method.as_str().to_lowercase(), suffix)
}

fn body_verb(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}
