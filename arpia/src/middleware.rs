//! Middleware chain.
//!
//! Middleware wrap the adapted handler onion-style: each one receives the
//! request context and a [`Next`], and decides whether to call through.
//! Closures with the matching signature implement [`Middleware`] directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use http::Response;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::response::BoxBody;

pub type BoxFuture = Pin<Box<dyn Future<Output = Response<BoxBody>> + Send>>;

/// The terminal of a middleware chain: the adapted route handler.
pub type Endpoint = Arc<dyn Fn(RequestContext) -> BoxFuture + Send + Sync>;

pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: RequestContext, next: Next) -> BoxFuture;
}

impl<F> Middleware for F
where
    F: Fn(RequestContext, Next) -> BoxFuture + Send + Sync + 'static,
{
    fn handle(&self, ctx: RequestContext, next: Next) -> BoxFuture {
        self(ctx, next)
    }
}

/// The remainder of a middleware chain, ending at the route handler.
pub struct Next {
    chain: Vec<Arc<dyn Middleware>>,
    index: usize,
    endpoint: Endpoint,
}

impl Next {
    pub(crate) fn new(chain: Vec<Arc<dyn Middleware>>, endpoint: Endpoint) -> Self {
        Self {
            chain,
            index: 0,
            endpoint,
        }
    }

    /// Runs the rest of the chain.
    pub fn run(mut self, ctx: RequestContext) -> BoxFuture {
        if self.index < self.chain.len() {
            let middleware = Arc::clone(&self.chain[self.index]);
            self.index += 1;
            middleware.handle(ctx, self)
        } else {
            (self.endpoint)(ctx)
        }
    }
}

/// Logs one line per request: method, path, status, latency and a fresh
/// request id.
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn handle(&self, ctx: RequestContext, next: Next) -> BoxFuture {
        let method = ctx.method().clone();
        let path = ctx.path().to_string();
        let request_id = Uuid::new_v4();
        let start = Instant::now();
        Box::pin(async move {
            let response = next.run(ctx).await;
            tracing::info!(
                %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                %request_id,
                "request"
            );
            response
        })
    }
}
