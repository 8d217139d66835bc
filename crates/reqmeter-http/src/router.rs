//! Axum router wiring.
//!
//! `InstrumentedRouter` registers each route together with its
//! `RouteDescriptor`; timing runs as a route layer, so requests that match no
//! route are never seen by it.

use std::sync::Arc;

use axum::{middleware, routing::get, routing::MethodRouter, Router};

use reqmeter_core::RouteDescriptor;

use crate::{app_state::AppState, layer, listener::RequestMetricsListener, ops};

pub struct InstrumentedRouter<S = ()> {
    router: Router<S>,
    listener: Arc<RequestMetricsListener>,
}

impl<S> InstrumentedRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(listener: Arc<RequestMetricsListener>) -> Self {
        Self { router: Router::new(), listener }
    }

    /// Register a handler under `path`, identified by `route` for annotation lookup.
    pub fn route(
        mut self,
        path: &str,
        route: RouteDescriptor,
        method_router: MethodRouter<S>,
    ) -> Self {
        let timing = layer::RouteTiming {
            listener: Arc::clone(&self.listener),
            route,
        };
        self.router = self.router.route(
            path,
            method_router.route_layer(middleware::from_fn_with_state(timing, layer::timed_route)),
        );
        self
    }

    /// Register a handler that bypasses timing entirely.
    pub fn untimed(mut self, path: &str, method_router: MethodRouter<S>) -> Self {
        self.router = self.router.route(path, method_router);
        self
    }

    pub fn into_router(self) -> Router<S> {
        self.router
    }
}

/// Operational endpoints (`/healthz`, `/metrics`).
pub fn ops_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
