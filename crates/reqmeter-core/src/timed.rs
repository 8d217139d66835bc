//! `Timed` annotation value.
//!
//! A `Timed` marks a resource type or handler method as timed. Several may be
//! attached to the same element; each one yields its own timer.

use serde::Deserialize;

use crate::tags::TagSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timed {
    /// Metric name. `None`/empty falls back to the listener's base name,
    /// except for long tasks, which must be named.
    #[serde(default)]
    pub name: Option<String>,

    /// Static tags appended after the derived request tags.
    #[serde(default)]
    pub extra_tags: TagSet,

    /// Record an in-flight (long-task) timer instead of a completed timer.
    #[serde(default)]
    pub long_task: bool,
}

impl Timed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a named completed timer.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().name(name)
    }

    /// Shorthand for a named long-task timer.
    pub fn long_task(name: impl Into<String>) -> Self {
        Self { long_task: true, ..Self::named(name) }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn extra_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_tags.insert(key, value);
        self
    }

    pub fn with_long_task(mut self, long_task: bool) -> Self {
        self.long_task = long_task;
        self
    }

    /// Explicit, non-blank name if one was given.
    pub fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}
