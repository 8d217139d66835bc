//! In-process metrics backend.
//!
//! `MeterRegistry` is the default [`reqmeter_core::Recorder`]: meters are held
//! in `DashMap`s keyed by name and sorted tags, and rendered by the `/metrics`
//! handler.

pub mod registry;

pub use registry::{LongTaskSnapshot, MeterId, MeterKind, MeterRegistry, Search, TimerSnapshot};
