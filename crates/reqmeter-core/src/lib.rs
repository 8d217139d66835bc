//! reqmeter core: transport-agnostic request timing primitives.
//!
//! This crate decides *whether* and *how* a request is timed: it resolves
//! `Timed` annotations for a route, drives the per-request lifecycle, and
//! builds tag sets. Recording is delegated to a [`Recorder`] implementation,
//! so nothing in here depends on an HTTP stack or a metrics backend.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `ReqMeterError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod lifecycle;
pub mod provider;
pub mod recorder;
pub mod resolver;
pub mod route;
pub mod tags;
pub mod timed;

/// Shared result type.
pub use error::{Result, ReqMeterError};

pub use lifecycle::{Effect, Phase, RequestContext, RequestLifecycle};
pub use provider::{DefaultTagsProvider, TagsProvider};
pub use recorder::{apply_effects, LongTaskHandle, Recorder};
pub use resolver::{AnnotationCatalog, LongTaskSpec, TimerSpec, TimingConfig, TimingResolver};
pub use route::RouteDescriptor;
pub use tags::{Tag, TagSet};
pub use timed::Timed;

/// Base metric name for completed request timers when none is configured.
pub const DEFAULT_METRIC_NAME: &str = "http.server.requests";
