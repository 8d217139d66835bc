//! Tags and tag sets.
//!
//! A `TagSet` keeps its entries sorted by key with unique keys, so two sets
//! built from the same pairs compare equal regardless of insertion order.
//! Registries key meters by `(name, TagSet)`, which relies on this.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer};

/// A single key/value pair attached to a metric sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Ordered set of tags, unique by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagSet {
    tags: Vec<Tag>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from alternating pairs, e.g. `TagSet::of([("method", "GET")])`.
    pub fn of<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs.into_iter().collect()
    }

    /// Insert a tag; an existing tag with the same key is replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let tag = Tag::new(key, value);
        match self.tags.binary_search_by(|t| t.key.cmp(&tag.key)) {
            Ok(i) => self.tags[i] = tag,
            Err(i) => self.tags.insert(i, tag),
        }
    }

    /// Builder-style insert.
    pub fn and(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Concatenate `other` after `self`. Keys in `other` win.
    pub fn concat(&self, other: &TagSet) -> TagSet {
        let mut out = self.clone();
        for t in &other.tags {
            out.insert(t.key.clone(), t.value.clone());
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .binary_search_by(|t| t.key.as_str().cmp(key))
            .ok()
            .map(|i| self.tags[i].value.as_str())
    }

    /// True when every tag of `subset` is present here with the same value.
    pub fn contains_all<'a>(&self, subset: impl IntoIterator<Item = &'a Tag>) -> bool {
        subset.into_iter().all(|t| self.get(&t.key) == Some(t.value.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, t) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", t.key, t.value)?;
        }
        f.write_str("}")
    }
}

// Config files declare tags as a plain map: `extra_tags: { on: class }`.
impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, String>::deserialize(deserializer)?;
        Ok(map.into_iter().collect())
    }
}
