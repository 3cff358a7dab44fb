//! Per-request context handed to handlers and middleware.
//!
//! The body is collected before dispatch (streaming is out of scope), so
//! the context is a plain value that can be moved through the middleware
//! chain and into the handler.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use http::request::Parts;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::plan::Source;
use crate::state::AppState;
use crate::validate::Validator;

/// Path parameters captured by the router, keyed by `:name`.
pub type PathParams = HashMap<String, String>;

/// The request context. Aliased as [`Ctx`](crate::Ctx) in the prelude.
pub struct RequestContext {
    parts: Parts,
    body: Bytes,
    params: PathParams,
    query: Vec<(String, String)>,
    state: Arc<AppState>,
    validator: Arc<Validator>,
}

impl RequestContext {
    pub(crate) fn new(
        parts: Parts,
        body: Bytes,
        params: PathParams,
        state: Arc<AppState>,
        validator: Arc<Validator>,
    ) -> Self {
        let query = parts
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str::<Vec<(String, String)>>(q).ok())
            .unwrap_or_default();
        Self {
            parts,
            body,
            params,
            query,
            state,
            validator,
        }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }

    /// Named path parameter, as matched by the router.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// First query-string value for `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Value of a cookie from the `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header("cookie")?.split(';').find_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            (k == name).then_some(v)
        })
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decodes the raw body as JSON; for handlers without an input schema
    /// that still want the payload.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::parse("body", Source::Body, format!("invalid JSON: {}", e)))
    }

    /// Application state registered at build time.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.state.get::<T>()
    }

    pub(crate) fn validator(&self) -> Arc<Validator> {
        Arc::clone(&self.validator)
    }

    /// Raw string value for a field source, before coercion.
    pub(crate) fn raw_value(&self, source: Source, key: &str) -> Option<String> {
        match source {
            Source::Path => self.param(key).map(String::from),
            Source::Query => self.query(key).map(String::from),
            Source::Header => self.header(key).map(String::from),
            Source::Cookie => self.cookie(key).map(String::from),
            Source::Auto => self
                .param(key)
                .or_else(|| self.query(key))
                .map(String::from),
            Source::Body | Source::Form => None,
        }
    }
}
