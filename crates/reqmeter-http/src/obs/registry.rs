//! In-process meter registry.
//!
//! Implements [`Recorder`] with two meter families keyed by `(name, TagSet)`:
//! timers (count/sum/max plus fixed microsecond buckets) and long-task timers
//! (set of currently open tasks). Lookups go through [`Search`], which matches
//! on name plus a subset of tags.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqmeter_core::{LongTaskHandle, Recorder, TagSet};

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Prometheus-safe metric name (`http.server.requests` -> `http_server_requests`).
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect()
}

fn label_str(tags: &TagSet) -> String {
    tags.iter()
        .map(|t| format!("{}=\"{}\"", sanitize_name(&t.key), escape_label(&t.value)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeterId {
    pub name: String,
    pub tags: TagSet,
}

impl MeterId {
    fn new(name: &str, tags: &TagSet) -> Self {
        Self { name: name.to_string(), tags: tags.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterKind {
    Timer,
    LongTaskTimer,
}

// Fixed Buckets in Microseconds
// 100us, 500us, 1ms, 5ms, 10ms, 50ms, 100ms, 500ms, 1s
const BUCKETS_MICROS: [u64; 9] =
    [100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000];

struct TimerCell {
    count: AtomicU64,
    sum_micros: AtomicU64,
    max_micros: AtomicU64,
    buckets: [AtomicU64; 9],
}

impl Default for TimerCell {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_micros: AtomicU64::new(0),
            max_micros: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

impl TimerCell {
    fn observe(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);

        // cumulative buckets
        for (i, &b) in BUCKETS_MICROS.iter().enumerate() {
            if micros <= b {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self, id: &MeterId) -> TimerSnapshot {
        TimerSnapshot {
            id: id.clone(),
            count: self.count.load(Ordering::Relaxed),
            total: Duration::from_micros(self.sum_micros.load(Ordering::Relaxed)),
            max: Duration::from_micros(self.max_micros.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Default)]
struct LongTaskCell {
    active: DashMap<u64, Instant>,
}

impl LongTaskCell {
    fn snapshot(&self, id: &MeterId) -> LongTaskSnapshot {
        let now = Instant::now();
        let duration = self
            .active
            .iter()
            .map(|e| now.saturating_duration_since(*e.value()))
            .sum();
        LongTaskSnapshot {
            id: id.clone(),
            active_tasks: self.active.len(),
            duration,
        }
    }
}

/// Point-in-time view of a completed-request timer.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSnapshot {
    pub id: MeterId,
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl TimerSnapshot {
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total / u32::try_from(self.count).unwrap_or(u32::MAX)
    }
}

/// Point-in-time view of a long-task timer.
#[derive(Debug, Clone, PartialEq)]
pub struct LongTaskSnapshot {
    pub id: MeterId,
    /// Requests currently holding a task open.
    pub active_tasks: usize,
    /// Summed age of all open tasks.
    pub duration: Duration,
}

#[derive(Default)]
pub struct MeterRegistry {
    timers: DashMap<MeterId, TimerCell>,
    long_tasks: DashMap<MeterId, Arc<LongTaskCell>>,
    next_task: AtomicU64,
}

impl MeterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a lookup by metric name; narrow with [`Search::tag`]/[`Search::tags`].
    pub fn find(&self, name: &str) -> Search<'_> {
        Search {
            registry: self,
            name: name.to_string(),
            tags: TagSet::new(),
        }
    }

    /// Every registered meter, sorted by id.
    pub fn meters(&self) -> Vec<(MeterKind, MeterId)> {
        let mut out: Vec<(MeterKind, MeterId)> = self
            .timers
            .iter()
            .map(|e| (MeterKind::Timer, e.key().clone()))
            .chain(
                self.long_tasks
                    .iter()
                    .map(|e| (MeterKind::LongTaskTimer, e.key().clone())),
            )
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1));
        out
    }

    /// Render in Prometheus text exposition format (unit: microseconds).
    ///
    /// Meter names are sanitized into family names. Distinct names that
    /// sanitize to the same family are rendered under it together.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let timers: Vec<TimerSnapshot> =
            self.timers.iter().map(|e| e.value().snapshot(e.key())).collect();
        for (family, group) in families(timers, |t| &t.id) {
            let name = format!("{}_micros", family);
            let _ = writeln!(out, "# TYPE {} histogram", name);
            for t in &group {
                let labels = label_str(&t.id.tags);
                let prefix = if labels.is_empty() { String::new() } else { format!("{},", labels) };
                if let Some(cell) = self.timers.get(&t.id) {
                    for (i, &le) in BUCKETS_MICROS.iter().enumerate() {
                        let count = cell.buckets[i].load(Ordering::Relaxed);
                        let _ =
                            writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", name, prefix, le, count);
                    }
                }
                let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, t.count);
                let _ = writeln!(out, "{}_sum{{{}}} {}", name, labels, t.total.as_micros());
                let _ = writeln!(out, "{}_count{{{}}} {}", name, labels, t.count);
            }
            let _ = writeln!(out, "# TYPE {}_max gauge", name);
            for t in &group {
                let labels = label_str(&t.id.tags);
                let _ = writeln!(out, "{}_max{{{}}} {}", name, labels, t.max.as_micros());
            }
        }

        let long_tasks: Vec<LongTaskSnapshot> =
            self.long_tasks.iter().map(|e| e.value().snapshot(e.key())).collect();
        for (family, group) in families(long_tasks, |lt| &lt.id) {
            let _ = writeln!(out, "# TYPE {}_active_tasks gauge", family);
            for lt in &group {
                let labels = label_str(&lt.id.tags);
                let _ = writeln!(out, "{}_active_tasks{{{}}} {}", family, labels, lt.active_tasks);
            }
            let _ = writeln!(out, "# TYPE {}_duration_micros gauge", family);
            for lt in &group {
                let labels = label_str(&lt.id.tags);
                let micros = lt.duration.as_micros();
                let _ = writeln!(out, "{}_duration_micros{{{}}} {}", family, labels, micros);
            }
        }
        out
    }
}

/// Group snapshots by exposition family, each group sorted by id.
/// Warns when more than one meter name lands in a family.
fn families<T>(items: Vec<T>, id: impl Fn(&T) -> &MeterId) -> BTreeMap<String, Vec<T>> {
    let mut out: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        out.entry(sanitize_name(&id(&item).name)).or_default().push(item);
    }
    for (family, group) in out.iter_mut() {
        group.sort_by(|a, b| id(a).cmp(id(b)));
        if let (Some(first), Some(last)) = (group.first(), group.last()) {
            if id(first).name != id(last).name {
                tracing::warn!(
                    %family,
                    first = %id(first).name,
                    other = %id(last).name,
                    "metric names collide after sanitizing; rendering them as one family"
                );
            }
        }
    }
    out
}

impl Recorder for MeterRegistry {
    fn record_duration(&self, name: &str, tags: &TagSet, duration: Duration) {
        self.timers
            .entry(MeterId::new(name, tags))
            .or_default()
            .observe(duration);
    }

    fn start_in_flight(&self, name: &str, tags: &TagSet) -> LongTaskHandle {
        let cell = Arc::clone(
            self.long_tasks
                .entry(MeterId::new(name, tags))
                .or_default()
                .value(),
        );
        let id = self.next_task.fetch_add(1, Ordering::Relaxed);
        cell.active.insert(id, Instant::now());
        LongTaskHandle { id, name: name.to_string(), tags: tags.clone() }
    }

    fn stop_in_flight(&self, handle: LongTaskHandle) -> Option<Duration> {
        let cell = self
            .long_tasks
            .get(&MeterId::new(&handle.name, &handle.tags))
            .map(|e| Arc::clone(e.value()))?;
        cell.active
            .remove(&handle.id)
            .map(|(_, started)| started.elapsed())
    }
}

/// Meter lookup by name and tag subset.
pub struct Search<'a> {
    registry: &'a MeterRegistry,
    name: String,
    tags: TagSet,
}

impl<'a> Search<'a> {
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    pub fn tags(mut self, tags: &TagSet) -> Self {
        self.tags = self.tags.concat(tags);
        self
    }

    fn matches(&self, id: &MeterId) -> bool {
        id.name == self.name && id.tags.contains_all(&self.tags)
    }

    /// All matching timers, sorted by id.
    pub fn timers(&self) -> Vec<TimerSnapshot> {
        let mut out: Vec<TimerSnapshot> = self
            .registry
            .timers
            .iter()
            .filter(|e| self.matches(e.key()))
            .map(|e| e.value().snapshot(e.key()))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn timer(&self) -> Option<TimerSnapshot> {
        self.timers().into_iter().next()
    }

    pub fn long_task_timer(&self) -> Option<LongTaskSnapshot> {
        let mut found: Vec<LongTaskSnapshot> = self
            .registry
            .long_tasks
            .iter()
            .filter(|e| self.matches(e.key()))
            .map(|e| e.value().snapshot(e.key()))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(uri: &str) -> TagSet {
        TagSet::of([("method", "GET"), ("uri", uri), ("status", "200"), ("exception", "None")])
    }

    #[test]
    fn timer_counts_and_subset_search() {
        let reg = MeterRegistry::new();
        reg.record_duration("http.server.requests", &tags("/a"), Duration::from_millis(2));
        reg.record_duration("http.server.requests", &tags("/a"), Duration::from_millis(4));
        reg.record_duration("http.server.requests", &tags("/b"), Duration::from_millis(1));

        let a = reg.find("http.server.requests").tag("uri", "/a").timer().unwrap();
        assert_eq!(a.count, 2);
        assert_eq!(a.total, Duration::from_millis(6));
        assert_eq!(a.max, Duration::from_millis(4));
        assert_eq!(a.mean(), Duration::from_millis(3));

        assert_eq!(reg.find("http.server.requests").timers().len(), 2);
        assert!(reg.find("http.server.requests").tag("uri", "/c").timer().is_none());
        assert!(reg.find("other").timer().is_none());
    }

    #[test]
    fn long_task_open_and_close() {
        let reg = MeterRegistry::new();
        let t = TagSet::of([("method", "GET"), ("uri", "/long")]);
        let h1 = reg.start_in_flight("long.task", &t);
        let h2 = reg.start_in_flight("long.task", &t);
        assert_ne!(h1.id, h2.id);
        assert_eq!(reg.find("long.task").long_task_timer().unwrap().active_tasks, 2);

        assert!(reg.stop_in_flight(h1.clone()).is_some());
        assert!(reg.stop_in_flight(h1).is_none());
        assert_eq!(reg.find("long.task").long_task_timer().unwrap().active_tasks, 1);

        reg.stop_in_flight(h2);
        let lt = reg.find("long.task").tags(&t).long_task_timer().unwrap();
        assert_eq!(lt.active_tasks, 0);
        assert_eq!(reg.meters(), vec![(MeterKind::LongTaskTimer, MeterId::new("long.task", &t))]);
    }

    #[test]
    fn render_prometheus_text() {
        let reg = MeterRegistry::new();
        reg.record_duration("http.server.requests", &tags("/a"), Duration::from_micros(300));
        let h = reg.start_in_flight("long.task", &TagSet::of([("uri", "/l")]));

        let text = reg.render();
        let labels = "exception=\"None\",method=\"GET\",status=\"200\",uri=\"/a\"";
        assert!(text.contains("# TYPE http_server_requests_micros histogram"));
        assert!(text.contains(&format!("http_server_requests_micros_count{{{labels}}} 1")));
        assert!(text.contains(&format!(
            "http_server_requests_micros_bucket{{{labels},le=\"500\"}} 1"
        )));
        assert!(text.contains("long_task_active_tasks{uri=\"/l\"} 1"));
        reg.stop_in_flight(h);
    }

    #[test]
    fn max_is_its_own_gauge_family() {
        let reg = MeterRegistry::new();
        reg.record_duration("http.server.requests", &tags("/a"), Duration::from_micros(300));
        let text = reg.render();

        let histogram = text.find("# TYPE http_server_requests_micros histogram").unwrap();
        let gauge = text.find("# TYPE http_server_requests_micros_max gauge").unwrap();
        let count = text.find("http_server_requests_micros_count{").unwrap();
        let max = text.find("http_server_requests_micros_max{").unwrap();
        assert!(histogram < count && count < gauge && gauge < max);
    }

    #[test]
    fn colliding_names_share_one_family() {
        let reg = MeterRegistry::new();
        reg.record_duration("a.b", &tags("/x"), Duration::from_micros(10));
        reg.record_duration("a_b", &tags("/y"), Duration::from_micros(10));
        reg.record_duration("a0", &tags("/z"), Duration::from_micros(10));

        let text = reg.render();
        assert_eq!(text.matches("# TYPE a_b_micros histogram").count(), 1);
        assert_eq!(text.matches("# TYPE a_b_micros_max gauge").count(), 1);
        assert_eq!(text.matches("a_b_micros_count{").count(), 2);
        // both meters stay distinct in the registry
        assert_eq!(reg.meters().len(), 3);
    }
}
