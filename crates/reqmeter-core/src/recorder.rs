//! Recorder seam towards a metrics registry.

use std::time::Duration;

use crate::lifecycle::{Effect, RequestLifecycle};
use crate::tags::TagSet;

/// Open in-flight timer owned by exactly one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongTaskHandle {
    pub id: u64,
    pub name: String,
    pub tags: TagSet,
}

/// Metrics backend consumed by the timing core.
///
/// Implementations own aggregation and storage; the core only supplies
/// names, tags and durations.
pub trait Recorder: Send + Sync {
    /// Record one completed request.
    fn record_duration(&self, name: &str, tags: &TagSet, duration: Duration);

    /// Open an in-flight timer for one request.
    fn start_in_flight(&self, name: &str, tags: &TagSet) -> LongTaskHandle;

    /// Close an in-flight timer. Returns how long it was open, if it was known.
    fn stop_in_flight(&self, handle: LongTaskHandle) -> Option<Duration>;
}

/// Perform the effects of a lifecycle transition against `recorder`.
pub fn apply_effects(
    recorder: &dyn Recorder,
    lifecycle: &mut RequestLifecycle,
    effects: Vec<Effect>,
) {
    for effect in effects {
        match effect {
            Effect::StartLongTask { name, tags } => {
                let handle = recorder.start_in_flight(&name, &tags);
                if let Some(orphan) = lifecycle.attach(handle) {
                    recorder.stop_in_flight(orphan);
                }
            }
            Effect::StopLongTask(handle) => {
                if recorder.stop_in_flight(handle.clone()).is_none() {
                    tracing::warn!(
                        name = %handle.name,
                        id = handle.id,
                        "in-flight timer was not open"
                    );
                }
            }
            Effect::Record { name, tags, duration } => {
                recorder.record_duration(&name, &tags, duration);
            }
        }
    }
}
