//! reqmeter HTTP integration for axum.
//!
//! Wires the timing core into axum: per-route timing middleware, the
//! `InstrumentedRouter` builder, an in-process `MeterRegistry`, strict YAML
//! config, and the operational endpoints. Consumed by the demo binary
//! (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod exception;
pub mod layer;
pub mod listener;
pub mod obs;
pub mod ops;
pub mod router;

pub use exception::HandlerException;
pub use listener::{ActiveRequest, RequestMetricsListener};
pub use obs::MeterRegistry;
pub use router::InstrumentedRouter;
