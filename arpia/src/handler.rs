//! The handler adapter: bridges typed user functions to route endpoints.
//!
//! Exactly two handler shapes are accepted, each as its own generic impl:
//!
//! - `async fn(Ctx) -> Result<R, Error>`: no input schema.
//! - `async fn(Ctx, T) -> Result<R, Error>`: input schema `T: ApiType`.
//!
//! Anything else does not implement [`ApiHandler`] and is rejected at
//! compile time, which keeps handler misuse out of the hot path entirely.
//! At request time the adapter runs extract, validate, the user function,
//! response validation (when a response schema is declared) and JSON
//! encoding, in that order.

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::copier;
use crate::error::{Error, FieldError};
use crate::extract;
use crate::middleware::BoxFuture;
use crate::plan::{ApiType, PlanRef, RecordPlan, plan_of};
use crate::response::{BoxBody, json_response};
use crate::validate::Validator;

/// A function registrable as a route handler.
///
/// `M` is an inference marker distinguishing the two shapes; user code
/// never names it.
pub trait ApiHandler<M>: Clone + Send + Sync + 'static {
    /// Plan of the declared input record, if this shape has one.
    fn request_plan() -> Option<PlanRef>;

    /// Runs the full request pipeline and produces the response.
    fn call(&self, ctx: RequestContext, response_plan: Option<PlanRef>) -> BoxFuture;
}

impl<F, Fut, R> ApiHandler<()> for F
where
    F: Fn(RequestContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn request_plan() -> Option<PlanRef> {
        None
    }

    fn call(&self, ctx: RequestContext, response_plan: Option<PlanRef>) -> BoxFuture {
        let handler = self.clone();
        Box::pin(async move {
            let validator = ctx.validator();
            match handler(ctx).await {
                Ok(output) => respond(&output, response_plan, &validator),
                Err(error) => error.into_response(),
            }
        })
    }
}

impl<F, Fut, T, R> ApiHandler<((), T)> for F
where
    F: Fn(RequestContext, T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    T: ApiType,
    R: Serialize + Send + 'static,
{
    fn request_plan() -> Option<PlanRef> {
        Some(PlanRef::of::<T>())
    }

    fn call(&self, ctx: RequestContext, response_plan: Option<PlanRef>) -> BoxFuture {
        let handler = self.clone();
        Box::pin(async move {
            let validator = ctx.validator();
            let (record, composed) = match extract::bind::<T>(&ctx) {
                Ok(bound) => bound,
                Err(error) => return error.into_response(),
            };
            let violations = validator.validate(plan_of::<T>(), &composed);
            if !violations.is_empty() {
                return Error::Validation(violations).into_response();
            }
            match handler(ctx, record).await {
                Ok(output) => respond(&output, response_plan, &validator),
                Err(error) => error.into_response(),
            }
        })
    }
}

/// Serializes the handler output, applying response validation first when
/// a response schema is declared. An invalid value is never written to the
/// wire; the 500 error document replaces it.
fn respond<R: Serialize>(
    output: &R,
    response_plan: Option<PlanRef>,
    validator: &Arc<Validator>,
) -> http::Response<BoxBody> {
    let value = match serde_json::to_value(output) {
        Ok(v) => v,
        Err(e) => {
            return Error::internal(format!("response serialization failed: {}", e))
                .into_response();
        }
    };
    if let Some(plan_ref) = response_plan {
        let plan = plan_ref.plan();
        if let Err(details) = check_response(validator, plan, &value) {
            return Error::ResponseValidation(details).into_response();
        }
    }
    json_response(StatusCode::OK, &value)
}

/// Response validation applies element-wise whenever the serialized value
/// is an array, regardless of the declared schema's own shape.
fn check_response(
    validator: &Validator,
    plan: &RecordPlan,
    value: &Value,
) -> Result<(), Vec<FieldError>> {
    match value {
        Value::Object(map) => {
            let copied = copier::copy_to_record(plan, map)?;
            let violations = validator.validate(plan, &copied);
            if violations.is_empty() {
                Ok(())
            } else {
                Err(violations)
            }
        }
        Value::Array(items) => {
            let mut all = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if let Err(errors) = check_response(validator, plan, item) {
                    for mut error in errors {
                        error.field = format!("[{}].{}", i, error.field);
                        all.push(error);
                    }
                }
            }
            if all.is_empty() { Ok(()) } else { Err(all) }
        }
        other => Err(vec![FieldError::new(
            "response",
            format!(
                "declared response schema expects an object, handler returned {}",
                match other {
                    Value::Null => "null",
                    Value::Bool(_) => "a boolean",
                    Value::Number(_) => "a number",
                    Value::String(_) => "a string",
                    _ => "an unexpected value",
                }
            ),
        )]),
    }
}
