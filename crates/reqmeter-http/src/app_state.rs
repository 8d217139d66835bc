//! Shared application state for the demo server.

use std::sync::Arc;

use crate::config::ReqMeterConfig;
use crate::listener::RequestMetricsListener;
use crate::obs::MeterRegistry;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ReqMeterConfig,
    registry: Arc<MeterRegistry>,
    listener: Arc<RequestMetricsListener>,
}

impl AppState {
    pub fn new(cfg: ReqMeterConfig) -> Self {
        let registry = Arc::new(MeterRegistry::new());
        let listener = Arc::new(RequestMetricsListener::from_config(&cfg, registry.clone()));
        Self {
            inner: Arc::new(AppStateInner { cfg, registry, listener }),
        }
    }

    pub fn cfg(&self) -> &ReqMeterConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> Arc<MeterRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn listener(&self) -> Arc<RequestMetricsListener> {
        Arc::clone(&self.inner.listener)
    }
}
