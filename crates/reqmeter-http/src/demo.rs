//! Demo resources. Their timing comes from the `resources` section of the
//! config, keyed by the type/method names used here.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Path, http::StatusCode, routing::get, Router};

use reqmeter_core::RouteDescriptor;
use reqmeter_http::{HandlerException, InstrumentedRouter, RequestMetricsListener};

const DEMO: &str = "DemoResource";

/// Error kind reported by `/orders/:id` for unknown ids.
struct OrderNotFound;

pub fn routes(listener: Arc<RequestMetricsListener>) -> Router {
    InstrumentedRouter::new(listener)
        .route("/timed", RouteDescriptor::new(DEMO, "timed"), get(|| async { "timed" }))
        .route("/not-timed", RouteDescriptor::new(DEMO, "not_timed"), get(|| async { "not-timed" }))
        .route(
            "/multi-timed",
            RouteDescriptor::new(DEMO, "multi_timed"),
            get(|| async { "multi-timed" }),
        )
        .route("/long-timed", RouteDescriptor::new(DEMO, "long_timed"), get(long_timed))
        .route("/orders/:id", RouteDescriptor::new(DEMO, "order"), get(order))
        .into_router()
}

async fn long_timed() -> &'static str {
    tokio::time::sleep(Duration::from_secs(2)).await;
    "long-timed"
}

async fn order(
    Path(id): Path<u64>,
) -> Result<String, (StatusCode, HandlerException, &'static str)> {
    if id == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            HandlerException::of::<OrderNotFound>(),
            "no such order",
        ));
    }
    Ok(format!("order {id}"))
}
