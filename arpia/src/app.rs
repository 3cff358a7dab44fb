//! The application builder and server.
//!
//! [`Arpia`] is a consuming builder: routes, state, custom rules and
//! middleware are registered up front, then [`Arpia::listen`] freezes the
//! configuration and serves it. Registration mistakes (duplicate routes,
//! malformed paths or bind annotations) panic during registration rather
//! than surfacing per request.

use std::convert::Infallible;
use std::sync::Arc;

use http::{Method, Request, Response};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use serde_json::Value;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::context::RequestContext;
use crate::error::Error;
use crate::handler::ApiHandler;
use crate::middleware::{Endpoint, Middleware, Next};
use crate::openapi::endpoint::{openapi_spec, swagger_ui};
use crate::openapi::{DocBuilder, OpenApiConfig, OpenApiRegistry, RouteDescriptor};
use crate::plan::{ApiType, PlanRef, Source};
use crate::response::BoxBody;
use crate::router::{PathPattern, Route, Router};
use crate::state::AppState;
use crate::validate::Validator;

const SPEC_PATH: &str = "/openapi.json";
const DOCS_PATH: &str = "/docs";

/// Per-route registration options.
#[derive(Default)]
pub struct RouteOpts {
    response: Option<PlanRef>,
    description: Option<String>,
    tags: Vec<String>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl RouteOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the response schema. The handler output is validated
    /// against it before being written, and the 200 response is documented
    /// with it.
    pub fn response<T: ApiType>(mut self) -> Self {
        self.response = Some(PlanRef::of::<T>());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Route-scoped middleware, run after the application chain.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }
}

/// The application builder.
pub struct Arpia {
    router: Router,
    validator: Validator,
    state: AppState,
    middleware: Vec<Arc<dyn Middleware>>,
    openapi: Option<OpenApiConfig>,
    descriptors: Vec<RouteDescriptor>,
}

impl Default for Arpia {
    fn default() -> Self {
        Self::new()
    }
}

impl Arpia {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            validator: Validator::new(),
            state: AppState::new(),
            middleware: Vec::new(),
            openapi: None,
            descriptors: Vec::new(),
        }
    }

    /// Enables document generation; `/openapi.json` and `/docs` are served
    /// once this is set.
    pub fn openapi(mut self, config: OpenApiConfig) -> Self {
        self.openapi = Some(config);
        self
    }

    /// Registers a shared state value, retrievable in handlers with
    /// [`RequestContext::state`].
    pub fn state<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.state.insert(value);
        self
    }

    /// Registers a custom validation rule usable as `#[validate("name")]`
    /// or `#[validate("name=param")]`.
    pub fn rule<F>(mut self, name: impl Into<String>, rule: F) -> Self
    where
        F: Fn(&Value, Option<&str>) -> bool + Send + Sync + 'static,
    {
        self.validator.register(name, rule);
        self
    }

    /// Application-wide middleware, run in registration order.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn get<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::GET), path, handler, opts)
    }

    pub fn post<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::POST), path, handler, opts)
    }

    pub fn put<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::PUT), path, handler, opts)
    }

    pub fn delete<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::DELETE), path, handler, opts)
    }

    pub fn patch<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::PATCH), path, handler, opts)
    }

    pub fn head<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::HEAD), path, handler, opts)
    }

    pub fn options<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::OPTIONS), path, handler, opts)
    }

    /// Registers under every verb; conflicts with any other registration
    /// on the same path.
    pub fn all<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(None, path, handler, opts)
    }

    /// Registers a group of routes under a shared prefix:
    ///
    /// ```ignore
    /// app.group("/orgs", |g| {
    ///     g.tag("orgs")
    ///         .get("/:org_id", fetch_org, RouteOpts::new())
    ///         .post("/:org_id/members", add_member, RouteOpts::new())
    /// })
    /// ```
    pub fn group<F>(self, prefix: &str, register: F) -> Self
    where
        F: FnOnce(RouteGroup) -> RouteGroup,
    {
        let group = RouteGroup {
            app: self,
            prefix: prefix.trim_end_matches('/').to_string(),
            tags: Vec::new(),
            middleware: Vec::new(),
        };
        register(group).app
    }

    fn route<M, H: ApiHandler<M>>(
        mut self,
        method: Option<Method>,
        path: &str,
        handler: H,
        opts: RouteOpts,
    ) -> Self {
        let response_plan = opts.response;
        let endpoint: Endpoint = Arc::new(move |ctx| handler.call(ctx, response_plan));
        self.router.add(Route {
            method: method.clone(),
            pattern: PathPattern::parse(path),
            endpoint,
            middleware: opts.middleware,
        });
        self.descriptors.push(RouteDescriptor {
            method,
            path: path.to_string(),
            request: H::request_plan(),
            response: response_plan,
            description: opts.description,
            tags: opts.tags,
        });
        self
    }

    /// `"METHOD /path"` for every registered route, in registration order.
    pub fn routes(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .map(|d| {
                let method = d
                    .method
                    .as_ref()
                    .map_or("ALL".to_string(), |m| m.to_string());
                format!("{} {}", method, d.path)
            })
            .collect()
    }

    /// Builds the document without serving, for inspection or export.
    pub fn openapi_document(&self) -> Option<crate::openapi::OpenApi> {
        let config = self.openapi.clone()?;
        let mut docs = DocBuilder::new(config);
        for descriptor in &self.descriptors {
            docs.push(descriptor.clone());
        }
        Some(docs.build())
    }

    fn freeze(self) -> Arc<Shared> {
        let registry = self.openapi_document().map(OpenApiRegistry::new);
        Arc::new(Shared {
            router: self.router,
            state: Arc::new(self.state),
            validator: Arc::new(self.validator),
            middleware: self.middleware,
            registry,
        })
    }

    /// Binds `addr` and serves until interrupted.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Binds per [`ArpiaConfig::from_env`](crate::config::ArpiaConfig) and
    /// serves until interrupted.
    pub async fn listen_env(self) -> std::io::Result<()> {
        let config = crate::config::ArpiaConfig::from_env();
        let addr = config
            .addr()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        self.listen(addr).await
    }

    /// Serves on an already-bound listener until interrupted.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let shared = self.freeze();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "listening");
        }
        let graceful = GracefulShutdown::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let io = TokioIo::new(stream);
                    let shared = Arc::clone(&shared);
                    let service = service_fn(move |req| {
                        let shared = Arc::clone(&shared);
                        async move { Ok::<_, Infallible>(handle(shared, req).await) }
                    });
                    let conn = graceful.watch(
                        http1::Builder::new().serve_connection(io, service),
                    );
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!("connection error: {}", e);
                        }
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    graceful.shutdown().await;
                    return Ok(());
                }
            }
        }
    }
}

/// Route registration scoped under a path prefix. Group tags and
/// middleware apply to every route registered through it.
pub struct RouteGroup {
    app: Arpia,
    prefix: String,
    tags: Vec<String>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl RouteGroup {
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn get<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::GET), path, handler, opts)
    }

    pub fn post<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::POST), path, handler, opts)
    }

    pub fn put<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::PUT), path, handler, opts)
    }

    pub fn delete<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::DELETE), path, handler, opts)
    }

    pub fn patch<M>(self, path: &str, handler: impl ApiHandler<M>, opts: RouteOpts) -> Self {
        self.route(Some(Method::PATCH), path, handler, opts)
    }

    fn route<M, H: ApiHandler<M>>(
        mut self,
        method: Option<Method>,
        path: &str,
        handler: H,
        mut opts: RouteOpts,
    ) -> Self {
        let full = format!("{}{}", self.prefix, path);
        opts.tags = self.tags.iter().cloned().chain(opts.tags).collect();
        opts.middleware = self
            .middleware
            .iter()
            .cloned()
            .chain(opts.middleware)
            .collect();
        self.app = self.app.route(method, &full, handler, opts);
        self
    }
}

/// Frozen application shared across connections.
struct Shared {
    router: Router,
    state: Arc<AppState>,
    validator: Arc<Validator>,
    middleware: Vec<Arc<dyn Middleware>>,
    registry: Option<OpenApiRegistry>,
}

async fn handle(shared: Arc<Shared>, req: Request<Incoming>) -> Response<BoxBody> {
    let (parts, body) = req.into_parts();

    if parts.method == Method::GET {
        if let Some(registry) = &shared.registry {
            match parts.uri.path() {
                SPEC_PATH => return openapi_spec(registry),
                DOCS_PATH => {
                    return swagger_ui(&registry.document().info.title, SPEC_PATH);
                }
                _ => {}
            }
        }
    }

    let Some((route, params)) = shared.router.find(&parts.method, parts.uri.path()) else {
        return Error::not_found("Not Found").into_response();
    };

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => {
            return Error::parse("body", Source::Body, "failed to read request body")
                .into_response();
        }
    };

    let ctx = RequestContext::new(
        parts,
        bytes,
        params,
        Arc::clone(&shared.state),
        Arc::clone(&shared.validator),
    );

    let chain: Vec<Arc<dyn Middleware>> = shared
        .middleware
        .iter()
        .chain(&route.middleware)
        .cloned()
        .collect();
    Next::new(chain, Arc::clone(&route.endpoint)).run(ctx).await
}
