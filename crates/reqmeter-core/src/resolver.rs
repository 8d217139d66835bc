//! Annotation resolution.
//!
//! Rules, in order:
//! - `Timed` on the handler method wins outright; the type is not consulted.
//! - Otherwise the declaring type's `Timed` set, walking up `extends` links
//!   until an ancestor carries one.
//! - Otherwise the route is untimed (or auto-timed, when enabled).
//!
//! Results are cached per `RouteDescriptor`. Resolution is pure, so two
//! threads racing on a cold route simply compute the same value twice.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Result, ReqMeterError};
use crate::route::RouteDescriptor;
use crate::tags::TagSet;
use crate::timed::Timed;

/// Declared annotations per resource type and per handler method.
#[derive(Debug, Clone, Default)]
pub struct AnnotationCatalog {
    types: HashMap<String, TypeEntry>,
    methods: HashMap<String, HashMap<String, Vec<Timed>>>,
}

#[derive(Debug, Clone, Default)]
struct TypeEntry {
    parent: Option<String>,
    timed: Vec<Timed>,
}

impl AnnotationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annotate_type(
        &mut self,
        ty: impl Into<String>,
        timed: impl IntoIterator<Item = Timed>,
    ) -> &mut Self {
        self.types.entry(ty.into()).or_default().timed.extend(timed);
        self
    }

    /// Declare `ty` as a subtype of `parent`; type-level `Timed` is inherited.
    pub fn extend_type(&mut self, ty: impl Into<String>, parent: impl Into<String>) -> &mut Self {
        self.types.entry(ty.into()).or_default().parent = Some(parent.into());
        self
    }

    pub fn annotate_method(
        &mut self,
        ty: impl Into<String>,
        method: impl Into<String>,
        timed: impl IntoIterator<Item = Timed>,
    ) -> &mut Self {
        self.methods
            .entry(ty.into())
            .or_default()
            .entry(method.into())
            .or_default()
            .extend(timed);
        self
    }

    /// `Timed` declared directly on the route's handler method.
    pub fn method_annotations(&self, route: &RouteDescriptor) -> &[Timed] {
        self.methods
            .get(route.declaring_type())
            .and_then(|m| m.get(route.method()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Effective type-level `Timed`: own, else nearest annotated ancestor.
    pub fn type_annotations(&self, ty: &str) -> Result<&[Timed]> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cur = Some(ty);
        while let Some(name) = cur {
            if !seen.insert(name) {
                return Err(ReqMeterError::BadRequest(format!(
                    "cyclic type hierarchy at {name}"
                )));
            }
            let Some(entry) = self.types.get(name) else { break };
            if !entry.timed.is_empty() {
                return Ok(&entry.timed);
            }
            cur = entry.parent.as_deref();
        }
        Ok(&[])
    }

    /// Elements carrying a long-task `Timed` without a name. Used for load-time warnings;
    /// the hard failure happens when such a route is requested.
    pub fn unnamed_long_tasks(&self) -> Vec<String> {
        let types = self
            .types
            .iter()
            .filter(|(_, e)| e.timed.iter().any(is_unnamed_long_task))
            .map(|(ty, _)| ty.clone());
        let methods = self.methods.iter().flat_map(|(ty, ms)| {
            ms.iter()
                .filter(|(_, timed)| timed.iter().any(is_unnamed_long_task))
                .map(move |(m, _)| format!("{ty}::{m}"))
        });
        let mut out: Vec<String> = types.chain(methods).collect();
        out.sort();
        out
    }
}

fn is_unnamed_long_task(t: &Timed) -> bool {
    t.long_task && t.explicit_name().is_none()
}

/// A completed-request timer to record when the request finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSpec {
    pub name: String,
    pub extra_tags: TagSet,
}

/// An in-flight timer to hold open while the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongTaskSpec {
    pub name: String,
    pub extra_tags: TagSet,
}

/// Effective timing for one route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingConfig {
    pub timers: Vec<TimerSpec>,
    pub long_tasks: Vec<LongTaskSpec>,
}

impl TimingConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.timers.is_empty() || !self.long_tasks.is_empty()
    }
}

/// Resolves and caches `TimingConfig` per route.
pub struct TimingResolver {
    catalog: AnnotationCatalog,
    metric_name: String,
    auto_time: bool,
    cache: DashMap<RouteDescriptor, Arc<TimingConfig>>,
}

impl TimingResolver {
    pub fn new(catalog: AnnotationCatalog, metric_name: impl Into<String>) -> Self {
        Self {
            catalog,
            metric_name: metric_name.into(),
            auto_time: false,
            cache: DashMap::new(),
        }
    }

    /// Time unannotated (but matched) routes under the base metric name.
    pub fn with_auto_time(mut self, auto_time: bool) -> Self {
        self.auto_time = auto_time;
        self
    }

    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn catalog(&self) -> &AnnotationCatalog {
        &self.catalog
    }

    pub fn resolve(&self, route: &RouteDescriptor) -> Result<Arc<TimingConfig>> {
        if let Some(hit) = self.cache.get(route) {
            return Ok(Arc::clone(hit.value()));
        }

        let cfg = Arc::new(self.compute(route)?);
        tracing::debug!(
            %route,
            timers = cfg.timers.len(),
            long_tasks = cfg.long_tasks.len(),
            "timing resolved"
        );
        self.cache.insert(route.clone(), Arc::clone(&cfg));
        Ok(cfg)
    }

    fn compute(&self, route: &RouteDescriptor) -> Result<TimingConfig> {
        let on_method = self.catalog.method_annotations(route);
        let annotations = if on_method.is_empty() {
            self.catalog.type_annotations(route.declaring_type())?
        } else {
            on_method
        };

        if annotations.is_empty() {
            if !self.auto_time {
                return Ok(TimingConfig::disabled());
            }
            return Ok(TimingConfig {
                timers: vec![TimerSpec {
                    name: self.metric_name.clone(),
                    extra_tags: TagSet::new(),
                }],
                long_tasks: Vec::new(),
            });
        }

        let mut cfg = TimingConfig::default();
        let mut seen: Vec<&Timed> = Vec::with_capacity(annotations.len());
        for timed in annotations {
            if seen.contains(&timed) {
                continue;
            }
            seen.push(timed);

            if timed.long_task {
                let name = timed.explicit_name().ok_or_else(|| {
                    ReqMeterError::InvalidArgument(format!(
                        "long task timer on {route} requires a name"
                    ))
                })?;
                cfg.long_tasks.push(LongTaskSpec {
                    name: name.to_string(),
                    extra_tags: timed.extra_tags.clone(),
                });
            } else {
                let name = timed.explicit_name().unwrap_or(self.metric_name.as_str());
                cfg.timers.push(TimerSpec {
                    name: name.to_string(),
                    extra_tags: timed.extra_tags.clone(),
                });
            }
        }
        Ok(cfg)
    }
}
