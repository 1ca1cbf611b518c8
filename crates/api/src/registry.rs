//! Route registration surface.
//!
//! Every route is registered together with its requirement (or explicitly
//! without one). The registry attaches the guard to the route and records
//! the pair in a [`RouteTable`], which is immutable once the registry is
//! finished.

use std::sync::Arc;

use axum::handler::Handler;
use axum::http::Method;
use axum::routing::{on, MethodFilter};
use axum::Router;
use serde::Serialize;
use tracing::debug;

use contentgate_auth::{AuthorizationPipeline, RouteRequirement};
use contentgate_core::{Action, GateError, GateResult, Resource};

use crate::middleware::{guard_middleware, GuardState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub method: String,
    pub path: String,
    pub requirement: Option<RouteRequirement>,
}

/// Read-only view of every registered route and its requirement.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Arc<Vec<RouteEntry>>,
}

impl RouteTable {
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Requirement registered for `(method, path)`, where `path` is the
    /// route template (e.g. `/api/contents/:id`).
    pub fn requirement_for(&self, method: &Method, path: &str) -> Option<&RouteRequirement> {
        self.entries
            .iter()
            .find(|e| e.method == method.as_str() && e.path == path)
            .and_then(|e| e.requirement.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct RouteRegistry {
    pipeline: Arc<AuthorizationPipeline>,
    router: Router,
    entries: Vec<RouteEntry>,
}

impl RouteRegistry {
    pub fn new(pipeline: Arc<AuthorizationPipeline>) -> Self {
        Self {
            pipeline,
            router: Router::new(),
            entries: Vec::new(),
        }
    }

    /// Register `handler` for `method path`, guarded by `requirement`.
    pub fn route<H, T>(
        mut self,
        method: Method,
        path: &str,
        requirement: Option<RouteRequirement>,
        handler: H,
    ) -> GateResult<Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        if self.entries.iter().any(|e| e.method == method.as_str() && e.path == path) {
            return Err(GateError::configuration(format!("route {method} {path} registered twice")));
        }
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|e| GateError::configuration(format!("cannot route {method} {path}: {e}")))?;

        let guard = GuardState {
            pipeline: self.pipeline.clone(),
            requirement: requirement.clone(),
        };
        let endpoint =
            on(filter, handler).route_layer(axum::middleware::from_fn_with_state(guard, guard_middleware));
        self.router = self.router.route(path, endpoint);

        match &requirement {
            Some(req) => debug!(%method, path, requirement = %req, "route registered"),
            None => debug!(%method, path, "route registered without requirement"),
        }
        self.entries.push(RouteEntry {
            method: method.as_str().to_string(),
            path: path.to_string(),
            requirement,
        });
        Ok(self)
    }

    /// Register a route that requires `action` on `resource`.
    pub fn tagged<H, T>(
        self,
        method: Method,
        path: &str,
        resource: impl Into<Resource>,
        action: Action,
        handler: H,
    ) -> GateResult<Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        let requirement = RouteRequirement::new(resource, action)?;
        self.route(method, path, Some(requirement), handler)
    }

    /// Register a route with no requirement.
    pub fn open<H, T>(self, method: Method, path: &str, handler: H) -> GateResult<Self>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        self.route(method, path, None, handler)
    }

    pub fn finish(self) -> (Router, RouteTable) {
        let table = RouteTable {
            entries: Arc::new(self.entries),
        };
        (self.router, table)
    }
}
