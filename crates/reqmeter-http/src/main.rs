//! reqmeter demo server.
//!
//! - Loads `reqmeter.yaml` (or the path given as first argument)
//! - Serves the demo resources through `InstrumentedRouter`
//! - Exposes `/metrics` and `/healthz`

mod demo;

use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use reqmeter_http::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "reqmeter.yaml".to_string());
    let cfg = config::load_from_file(&path).expect("config load failed");
    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .expect("server.listen must be a valid SocketAddr");

    let state = app_state::AppState::new(cfg);
    let app = demo::routes(state.listener()).merge(router::ops_router(state.clone()));

    tracing::info!(
        %listen,
        metric = %state.cfg().metrics.metric_name,
        resources = state.cfg().resources.len(),
        "reqmeter-demo starting"
    );
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    axum::serve(listener, app).await.expect("server failed");
}
