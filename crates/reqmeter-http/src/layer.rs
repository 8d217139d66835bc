//! Route-level timing middleware.
//!
//! Attached per route by [`crate::router::InstrumentedRouter`], so it only
//! runs for requests axum actually matched; 404s never get here.
//!
//! Order per request:
//! 1. resolve the route's timing (fail fast on invalid declarations)
//! 2. open in-flight timers
//! 3. run the handler (panics are caught, recorded, then resumed)
//! 4. record completed timers and release in-flight ones

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::FutureExt;
use serde_json::json;

use reqmeter_core::error::ReqMeterError;
use reqmeter_core::RouteDescriptor;

use crate::exception::{HandlerException, PANIC_EXCEPTION};
use crate::listener::RequestMetricsListener;

/// Middleware state: the shared listener plus this route's identity.
#[derive(Clone)]
pub struct RouteTiming {
    pub listener: Arc<RequestMetricsListener>,
    pub route: RouteDescriptor,
}

pub async fn timed_route(State(timing): State<RouteTiming>, req: Request, next: Next) -> Response {
    let started_at = Instant::now();
    let uri_template = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let mut active = timing.listener.begin(req.method().as_str(), started_at);
    if let Err(e) = active.matched(&timing.route, &uri_template) {
        tracing::error!(
            route = %timing.route,
            uri = %uri_template,
            error = %e,
            "request timing failed"
        );
        return error_response(&e);
    }
    active.handler_start();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => {
            let exception = response
                .extensions()
                .get::<HandlerException>()
                .map(HandlerException::kind);
            active.finish(response.status().as_u16(), exception);
            response
        }
        Err(panic) => {
            tracing::error!(route = %timing.route, "handler panicked");
            active.finish(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), Some(PANIC_EXCEPTION));
            std::panic::resume_unwind(panic)
        }
    }
}

fn error_response(e: &ReqMeterError) -> Response {
    let body = json!({
        "code": e.client_code().as_str(),
        "msg": e.to_string(),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
