//! Per-request timing lifecycle.
//!
//! `Unmatched -> Matched -> (InFlight) -> Finished`
//!
//! Transitions never touch a recorder. Each returns the [`Effect`]s it wants
//! performed; the caller applies them (see [`crate::recorder::apply_effects`]).
//! This keeps the decision logic testable without a registry or HTTP stack.

use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, ReqMeterError};
use crate::provider::TagsProvider;
use crate::recorder::LongTaskHandle;
use crate::resolver::TimingConfig;
use crate::tags::TagSet;

/// Request metadata visible to tag providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    pub uri_template: String,
    /// Absent while the request is in flight.
    pub status: Option<u16>,
    /// Kind of the error the handler failed with, if any.
    pub exception: Option<String>,
}

impl RequestContext {
    pub fn matched(method: &str, uri_template: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            uri_template: uri_template.into(),
            status: None,
            exception: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unmatched,
    Matched,
    InFlight,
    Finished,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartLongTask { name: String, tags: TagSet },
    StopLongTask(LongTaskHandle),
    Record { name: String, tags: TagSet, duration: Duration },
}

#[derive(Debug)]
enum State {
    Unmatched {
        method: String,
    },
    Matched {
        ctx: RequestContext,
        config: Arc<TimingConfig>,
    },
    InFlight {
        ctx: RequestContext,
        config: Arc<TimingConfig>,
        open: Vec<LongTaskHandle>,
    },
    Finished,
}

#[derive(Debug)]
pub struct RequestLifecycle {
    started_at: Instant,
    state: State,
}

impl RequestLifecycle {
    pub fn new(method: &str, started_at: Instant) -> Self {
        Self {
            started_at,
            state: State::Unmatched { method: method.to_ascii_uppercase() },
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Unmatched { .. } => Phase::Unmatched,
            State::Matched { .. } => Phase::Matched,
            State::InFlight { .. } => Phase::InFlight,
            State::Finished => Phase::Finished,
        }
    }

    pub fn context(&self) -> Option<&RequestContext> {
        match &self.state {
            State::Matched { ctx, .. } | State::InFlight { ctx, .. } => Some(ctx),
            _ => None,
        }
    }

    /// Number of in-flight handles this request currently owns.
    pub fn open_long_tasks(&self) -> usize {
        match &self.state {
            State::InFlight { open, .. } => open.len(),
            _ => 0,
        }
    }

    /// The framework resolved a route for this request.
    pub fn on_matched(
        &mut self,
        uri_template: impl Into<String>,
        config: Arc<TimingConfig>,
    ) -> Result<()> {
        let State::Unmatched { method } = &self.state else {
            return Err(ReqMeterError::Internal(format!(
                "request matched twice (phase {:?})",
                self.phase()
            )));
        };
        let ctx = RequestContext::matched(method, uri_template);
        self.state = State::Matched { ctx, config };
        Ok(())
    }

    /// Routing is done and the handler is about to run. Opens one in-flight
    /// timer per `LongTaskSpec`, tagged with match-time data only.
    pub fn on_handler_start(&mut self, tags: &dyn TagsProvider) -> Vec<Effect> {
        let State::Matched { ctx, config } = &self.state else {
            return Vec::new();
        };
        if config.long_tasks.is_empty() {
            return Vec::new();
        }

        let base = tags.long_request_tags(ctx);
        let effects = config
            .long_tasks
            .iter()
            .map(|spec| Effect::StartLongTask {
                name: spec.name.clone(),
                tags: base.concat(&spec.extra_tags),
            })
            .collect();

        if let State::Matched { ctx, config } = mem::replace(&mut self.state, State::Finished) {
            self.state = State::InFlight { ctx, config, open: Vec::new() };
        }
        effects
    }

    /// Hand an opened in-flight handle to the request. Returns the handle back
    /// when the request can no longer own it; the caller must stop it.
    pub fn attach(&mut self, handle: LongTaskHandle) -> Option<LongTaskHandle> {
        match &mut self.state {
            State::InFlight { open, .. } => {
                open.push(handle);
                None
            }
            _ => Some(handle),
        }
    }

    /// The request finished, normally or with a handler error. In-flight
    /// handles are released before the completed samples are recorded.
    pub fn on_finished(
        &mut self,
        status: u16,
        exception: Option<&str>,
        finished_at: Instant,
        tags: &dyn TagsProvider,
    ) -> Vec<Effect> {
        let duration = finished_at.saturating_duration_since(self.started_at);
        let (mut ctx, config, open) = match mem::replace(&mut self.state, State::Finished) {
            State::Matched { ctx, config } => (ctx, config, Vec::new()),
            State::InFlight { ctx, config, open } => (ctx, config, open),
            State::Unmatched { .. } | State::Finished => return Vec::new(),
        };

        ctx.status = Some(status);
        ctx.exception = exception.map(str::to_string);

        let mut effects: Vec<Effect> = open.into_iter().map(Effect::StopLongTask).collect();
        if config.timers.is_empty() {
            return effects;
        }

        let base = tags.request_tags(&ctx);
        effects.extend(config.timers.iter().map(|spec| Effect::Record {
            name: spec.name.clone(),
            tags: base.concat(&spec.extra_tags),
            duration,
        }));
        effects
    }

    /// The request was abandoned (client gone, future dropped). Releases
    /// in-flight handles; no completed sample is recorded.
    pub fn on_cancelled(&mut self) -> Vec<Effect> {
        match mem::replace(&mut self.state, State::Finished) {
            State::InFlight { open, .. } => open.into_iter().map(Effect::StopLongTask).collect(),
            _ => Vec::new(),
        }
    }
}
