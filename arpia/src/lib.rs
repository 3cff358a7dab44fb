//! Typed HTTP handlers with request binding, validation and OpenAPI docs.
//!
//! `arpia` turns plain async functions into validated endpoints. A handler
//! declares its input as a struct deriving [`ApiType`]; field attributes
//! say where each value comes from (`#[bind("query:...")]`) and what makes
//! it valid (`#[validate("required,email")]`). The same declarations feed
//! the generated OpenAPI 3.0 document, so runtime behavior and docs cannot
//! drift apart.
//!
//! ```ignore
//! use arpia::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, ApiType)]
//! struct LoginRequest {
//!     #[validate("required,email")]
//!     email: String,
//!     #[validate("required,min=6")]
//!     password: String,
//! }
//!
//! #[derive(Serialize, Deserialize, ApiType)]
//! struct LoginResponse {
//!     token: String,
//! }
//!
//! async fn login(_ctx: Ctx, req: LoginRequest) -> Result<LoginResponse> {
//!     Ok(LoginResponse { token: issue_token(&req.email) })
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     arpia::logging::init();
//!     Arpia::new()
//!         .openapi(OpenApiConfig::new("Demo", "1.0.0"))
//!         .post("/auth/login", login, RouteOpts::new().response::<LoginResponse>())
//!         .listen("127.0.0.1:8000")
//!         .await
//! }
//! ```
//!
//! Handlers come in exactly two shapes, `async fn(Ctx) -> Result<R>` and
//! `async fn(Ctx, T) -> Result<R>`; anything else is a compile error.

extern crate self as arpia;

pub mod app;
pub mod coerce;
pub mod config;
pub mod context;
pub mod copier;
pub mod error;
pub mod extract;
pub mod handler;
pub mod logging;
pub mod middleware;
pub mod openapi;
pub mod plan;
pub mod response;
pub mod router;
pub mod state;
pub mod testing;
pub mod validate;

pub use app::{Arpia, RouteGroup, RouteOpts};
pub use arpia_macros::ApiType;
pub use config::ArpiaConfig;
pub use context::{PathParams, RequestContext};
pub use error::{Error, FieldError, Result};
pub use middleware::{BoxFuture, Middleware, Next, RequestLogger};
pub use openapi::{OpenApi, OpenApiConfig};
pub use plan::ApiType;

/// Short alias for the request context, matching the handler signatures
/// used throughout the docs.
pub type Ctx = RequestContext;

pub mod prelude {
    pub use crate::{
        ApiType, Arpia, Ctx, Error, Middleware, Next, OpenApiConfig, RequestLogger, Result,
        RouteOpts,
    };
}
