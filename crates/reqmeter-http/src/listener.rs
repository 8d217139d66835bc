//! Request metrics listener.
//!
//! Binds the timing core to a recorder: resolves routes, drives each request's
//! lifecycle, and applies the resulting effects. One listener is shared by all
//! instrumented routes.

use std::sync::Arc;
use std::time::Instant;

use reqmeter_core::error::Result;
use reqmeter_core::{
    apply_effects, DefaultTagsProvider, Phase, Recorder, RequestLifecycle, RouteDescriptor,
    TagsProvider, TimingResolver,
};

use crate::config::ReqMeterConfig;

pub struct RequestMetricsListener {
    resolver: TimingResolver,
    recorder: Arc<dyn Recorder>,
    tags: Arc<dyn TagsProvider>,
}

impl RequestMetricsListener {
    pub fn new(recorder: Arc<dyn Recorder>, resolver: TimingResolver) -> Self {
        Self {
            resolver,
            recorder,
            tags: Arc::new(DefaultTagsProvider),
        }
    }

    /// Build from config: base metric name, auto-time and the resource catalog.
    pub fn from_config(cfg: &ReqMeterConfig, recorder: Arc<dyn Recorder>) -> Self {
        let catalog = cfg.catalog();
        for element in catalog.unnamed_long_tasks() {
            tracing::warn!(%element, "long task timer without a name; requests to it will fail");
        }
        let resolver = TimingResolver::new(catalog, cfg.metrics.metric_name.clone())
            .with_auto_time(cfg.metrics.auto_time_requests);
        Self::new(recorder, resolver)
    }

    pub fn with_tags_provider(mut self, tags: Arc<dyn TagsProvider>) -> Self {
        self.tags = tags;
        self
    }

    pub fn resolver(&self) -> &TimingResolver {
        &self.resolver
    }

    pub fn begin(self: &Arc<Self>, method: &str, started_at: Instant) -> ActiveRequest {
        ActiveRequest {
            listener: Arc::clone(self),
            lifecycle: RequestLifecycle::new(method, started_at),
        }
    }
}

/// A request being timed. Dropping it before [`ActiveRequest::finish`]
/// releases any in-flight timers it holds.
pub struct ActiveRequest {
    listener: Arc<RequestMetricsListener>,
    lifecycle: RequestLifecycle,
}

impl ActiveRequest {
    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Resolve timing for the matched route. Fails on invalid declarations
    /// (e.g. an unnamed long task) before anything is recorded.
    pub fn matched(&mut self, route: &RouteDescriptor, uri_template: &str) -> Result<()> {
        let config = self.listener.resolver.resolve(route)?;
        self.lifecycle.on_matched(uri_template, config)
    }

    /// Routing is done; open in-flight timers.
    pub fn handler_start(&mut self) {
        let effects = self.lifecycle.on_handler_start(self.listener.tags.as_ref());
        apply_effects(self.listener.recorder.as_ref(), &mut self.lifecycle, effects);
    }

    pub fn finish(&mut self, status: u16, exception: Option<&str>) {
        let effects = self.lifecycle.on_finished(
            status,
            exception,
            Instant::now(),
            self.listener.tags.as_ref(),
        );
        apply_effects(self.listener.recorder.as_ref(), &mut self.lifecycle, effects);
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        if self.lifecycle.phase() == Phase::Finished {
            return;
        }
        let effects = self.lifecycle.on_cancelled();
        if !effects.is_empty() {
            tracing::debug!(released = effects.len(), "request dropped before finish");
        }
        apply_effects(self.listener.recorder.as_ref(), &mut self.lifecycle, effects);
    }
}
