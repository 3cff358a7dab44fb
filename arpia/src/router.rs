//! Method and path matching over the registered routes.
//!
//! Paths use `:name` parameter syntax (`/users/:user_id`). Matching is
//! segment-wise; the first matching route wins. Registering the same
//! method and path twice is fatal at startup.

use std::sync::Arc;

use http::Method;

use crate::context::PathParams;
use crate::middleware::{Endpoint, Middleware};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed `:name`-style path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parses a pattern. Panics on an unnamed parameter segment; route
    /// registration happens at startup where misdeclared paths are fatal.
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some("") => panic!("unnamed path parameter in route `{}`", path),
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self {
            raw: path.to_string(),
            segments,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = PathParams::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(params)
    }
}

pub(crate) struct Route {
    /// `None` registers the route under every method (`ALL`).
    pub method: Option<Method>,
    pub pattern: PathPattern,
    pub endpoint: Endpoint,
    pub middleware: Vec<Arc<dyn Middleware>>,
}

#[derive(Default)]
pub(crate) struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: Route) {
        let clash = self.routes.iter().any(|existing| {
            existing.pattern.raw() == route.pattern.raw()
                && (existing.method.is_none()
                    || route.method.is_none()
                    || existing.method == route.method)
        });
        if clash {
            panic!(
                "duplicate route registration: {} {}",
                route
                    .method
                    .as_ref()
                    .map_or("ALL".to_string(), |m| m.to_string()),
                route.pattern.raw()
            );
        }
        self.routes.push(route);
    }

    pub fn find(&self, method: &Method, path: &str) -> Option<(&Route, PathParams)> {
        self.routes.iter().find_map(|route| {
            if route.method.as_ref().is_some_and(|m| m != method) {
                return None;
            }
            route.pattern.matches(path).map(|params| (route, params))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        let pattern = PathPattern::parse("/users");
        assert!(pattern.matches("/users").is_some());
        assert!(pattern.matches("/users/42").is_none());
        assert!(pattern.matches("/orders").is_none());
    }

    #[test]
    fn test_param_capture() {
        let pattern = PathPattern::parse("/users/:user_id/posts/:post_id");
        let params = pattern.matches("/users/42/posts/7").unwrap();
        assert_eq!(params.get("user_id").map(String::as_str), Some("42"));
        assert_eq!(params.get("post_id").map(String::as_str), Some("7"));
    }

    #[test]
    fn test_trailing_slash_equivalent() {
        let pattern = PathPattern::parse("/users/:id");
        assert!(pattern.matches("/users/9/").is_some());
    }

    #[test]
    #[should_panic(expected = "unnamed path parameter")]
    fn test_unnamed_param_panics() {
        PathPattern::parse("/users/:");
    }

    fn noop_route(method: Option<Method>, path: &str) -> Route {
        Route {
            method,
            pattern: PathPattern::parse(path),
            endpoint: Arc::new(|_| {
                Box::pin(async {
                    crate::response::json_response(
                        http::StatusCode::OK,
                        &serde_json::json!(null),
                    )
                })
            }),
            middleware: Vec::new(),
        }
    }

    #[test]
    fn test_find_respects_method() {
        let mut router = Router::new();
        router.add(noop_route(Some(Method::GET), "/users"));
        assert!(router.find(&Method::GET, "/users").is_some());
        assert!(router.find(&Method::POST, "/users").is_none());
    }

    #[test]
    fn test_all_route_matches_every_method() {
        let mut router = Router::new();
        router.add(noop_route(None, "/anything"));
        assert!(router.find(&Method::GET, "/anything").is_some());
        assert!(router.find(&Method::DELETE, "/anything").is_some());
    }

    #[test]
    #[should_panic(expected = "duplicate route registration")]
    fn test_duplicate_route_is_fatal() {
        let mut router = Router::new();
        router.add(noop_route(Some(Method::GET), "/users"));
        router.add(noop_route(Some(Method::GET), "/users"));
    }
}
