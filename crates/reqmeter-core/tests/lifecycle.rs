//! Request lifecycle transitions and their effects.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqmeter_core::{
    apply_effects, DefaultTagsProvider, Effect, LongTaskHandle, LongTaskSpec, Phase, Recorder,
    RequestLifecycle, TagSet, TimerSpec, TimingConfig,
};

#[derive(Default)]
struct FakeRecorder {
    next: AtomicU64,
    recorded: Mutex<Vec<(String, TagSet, Duration)>>,
    open: Mutex<Vec<LongTaskHandle>>,
}

impl Recorder for FakeRecorder {
    fn record_duration(&self, name: &str, tags: &TagSet, duration: Duration) {
        self.recorded.lock().unwrap().push((name.to_string(), tags.clone(), duration));
    }

    fn start_in_flight(&self, name: &str, tags: &TagSet) -> LongTaskHandle {
        let h = LongTaskHandle {
            id: self.next.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            tags: tags.clone(),
        };
        self.open.lock().unwrap().push(h.clone());
        h
    }

    fn stop_in_flight(&self, handle: LongTaskHandle) -> Option<Duration> {
        let mut open = self.open.lock().unwrap();
        let idx = open.iter().position(|h| h.id == handle.id)?;
        open.remove(idx);
        Some(Duration::ZERO)
    }
}

fn long_timed() -> Arc<TimingConfig> {
    Arc::new(TimingConfig {
        timers: vec![TimerSpec { name: "http.server.requests".into(), extra_tags: TagSet::new() }],
        long_tasks: vec![LongTaskSpec {
            name: "long.task.in.request".into(),
            extra_tags: TagSet::new(),
        }],
    })
}

#[test]
fn disabled_route_produces_no_effects() {
    let t0 = Instant::now();
    let mut lc = RequestLifecycle::new("get", t0);
    lc.on_matched("/not-timed", Arc::new(TimingConfig::disabled())).unwrap();
    assert_eq!(lc.phase(), Phase::Matched);

    assert!(lc.on_handler_start(&DefaultTagsProvider).is_empty());
    assert!(lc.on_finished(200, None, t0, &DefaultTagsProvider).is_empty());
    assert_eq!(lc.phase(), Phase::Finished);
}

#[test]
fn unmatched_request_is_never_timed() {
    let t0 = Instant::now();
    let mut lc = RequestLifecycle::new("GET", t0);
    assert!(lc.on_handler_start(&DefaultTagsProvider).is_empty());
    assert!(lc.on_finished(404, None, t0, &DefaultTagsProvider).is_empty());
}

#[test]
fn long_task_is_open_until_finish() {
    let rec = FakeRecorder::default();
    let t0 = Instant::now();
    let mut lc = RequestLifecycle::new("GET", t0);
    lc.on_matched("/long-timed", long_timed()).unwrap();

    let start = lc.on_handler_start(&DefaultTagsProvider);
    assert_eq!(
        start,
        vec![Effect::StartLongTask {
            name: "long.task.in.request".into(),
            tags: TagSet::of([("method", "GET"), ("uri", "/long-timed")]),
        }]
    );
    apply_effects(&rec, &mut lc, start);
    assert_eq!(lc.phase(), Phase::InFlight);
    assert_eq!(lc.open_long_tasks(), 1);
    assert_eq!(rec.open.lock().unwrap().len(), 1);
    assert!(rec.recorded.lock().unwrap().is_empty());

    let done = lc.on_finished(200, None, t0 + Duration::from_millis(5), &DefaultTagsProvider);
    assert!(matches!(done[0], Effect::StopLongTask(_)));
    apply_effects(&rec, &mut lc, done);

    assert!(rec.open.lock().unwrap().is_empty());
    let recorded = rec.recorded.lock().unwrap();
    assert_eq!(recorded.len(), 1);
    let (name, tags, duration) = &recorded[0];
    assert_eq!(name, "http.server.requests");
    assert_eq!(
        *tags,
        TagSet::of([
            ("method", "GET"),
            ("uri", "/long-timed"),
            ("status", "200"),
            ("exception", "None"),
        ])
    );
    assert_eq!(*duration, Duration::from_millis(5));
}

#[test]
fn handler_error_still_records_and_releases() {
    let rec = FakeRecorder::default();
    let t0 = Instant::now();
    let mut lc = RequestLifecycle::new("GET", t0);
    lc.on_matched("/long-timed", long_timed()).unwrap();
    let start = lc.on_handler_start(&DefaultTagsProvider);
    apply_effects(&rec, &mut lc, start);

    let done = lc.on_finished(500, Some("app::Boom"), t0, &DefaultTagsProvider);
    apply_effects(&rec, &mut lc, done);

    assert!(rec.open.lock().unwrap().is_empty());
    let recorded = rec.recorded.lock().unwrap();
    assert_eq!(recorded[0].1.get("exception"), Some("Boom"));
    assert_eq!(recorded[0].1.get("status"), Some("500"));
}

#[test]
fn cancellation_releases_without_recording() {
    let rec = FakeRecorder::default();
    let mut lc = RequestLifecycle::new("GET", Instant::now());
    lc.on_matched("/long-timed", long_timed()).unwrap();
    let start = lc.on_handler_start(&DefaultTagsProvider);
    apply_effects(&rec, &mut lc, start);

    let cancel = lc.on_cancelled();
    apply_effects(&rec, &mut lc, cancel);

    assert!(rec.open.lock().unwrap().is_empty());
    assert!(rec.recorded.lock().unwrap().is_empty());
    // finishing after cancellation is a no-op
    assert!(lc.on_finished(200, None, Instant::now(), &DefaultTagsProvider).is_empty());
}

#[test]
fn concurrent_requests_own_independent_handles() {
    let rec = FakeRecorder::default();
    let mut a = RequestLifecycle::new("GET", Instant::now());
    let mut b = RequestLifecycle::new("GET", Instant::now());
    for lc in [&mut a, &mut b] {
        lc.on_matched("/long-timed", long_timed()).unwrap();
        let start = lc.on_handler_start(&DefaultTagsProvider);
        apply_effects(&rec, lc, start);
    }
    assert_eq!(rec.open.lock().unwrap().len(), 2);

    let done = a.on_finished(200, None, Instant::now(), &DefaultTagsProvider);
    apply_effects(&rec, &mut a, done);
    assert_eq!(rec.open.lock().unwrap().len(), 1);
    assert_eq!(b.open_long_tasks(), 1);
}

#[test]
fn static_tags_follow_derived_tags() {
    let t0 = Instant::now();
    let mut lc = RequestLifecycle::new("GET", t0);
    let cfg = Arc::new(TimingConfig {
        timers: vec![TimerSpec { name: "m".into(), extra_tags: TagSet::of([("on", "method")]) }],
        long_tasks: Vec::new(),
    });
    lc.on_matched("/class/on-method", cfg).unwrap();
    let effects = lc.on_finished(200, None, t0, &DefaultTagsProvider);
    let Effect::Record { tags, .. } = &effects[0] else { panic!("expected record") };
    assert_eq!(tags.get("on"), Some("method"));
    assert_eq!(tags.len(), 5);
}

#[test]
fn double_match_is_rejected() {
    let mut lc = RequestLifecycle::new("GET", Instant::now());
    lc.on_matched("/a", Arc::new(TimingConfig::disabled())).unwrap();
    assert!(lc.on_matched("/a", Arc::new(TimingConfig::disabled())).is_err());
}

#[test]
fn in_flight_tags_carry_static_tags_but_no_outcome() {
    let rec = FakeRecorder::default();
    let t0 = Instant::now();
    let mut lc = RequestLifecycle::new("get", t0);
    let cfg = Arc::new(TimingConfig {
        timers: Vec::new(),
        long_tasks: vec![LongTaskSpec {
            name: "long.task.in.request".into(),
            extra_tags: TagSet::of([("on", "method")]),
        }],
    });
    lc.on_matched("/users/:id", cfg).unwrap();

    let ctx = lc.context().unwrap();
    assert_eq!(ctx.method, "GET");
    assert_eq!(ctx.uri_template, "/users/:id");
    assert_eq!(ctx.status, None);

    let start = lc.on_handler_start(&DefaultTagsProvider);
    let Effect::StartLongTask { tags, .. } = start[0].clone() else { panic!("expected start") };
    assert_eq!(tags, TagSet::of([("method", "GET"), ("on", "method"), ("uri", "/users/:id")]));
    assert_eq!(tags.get("status"), None);
    assert_eq!(tags.get("exception"), None);

    apply_effects(&rec, &mut lc, start);
    assert_eq!(rec.open.lock().unwrap()[0].tags.len(), 3);

    let done = lc.on_finished(500, Some("app::Boom"), t0, &DefaultTagsProvider);
    let Effect::StopLongTask(handle) = &done[0] else { panic!("expected stop") };
    assert_eq!(handle.tags, tags);
    apply_effects(&rec, &mut lc, done);
    assert!(lc.context().is_none());
}
