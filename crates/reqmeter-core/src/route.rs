//! Route identity.

use std::fmt;
use std::sync::Arc;

/// Identifies a matched handler: the declaring resource type plus the method.
///
/// Both parts are opaque names chosen by whoever registers the route; the
/// resolver only uses them as lookup keys into the annotation catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteDescriptor {
    declaring_type: Arc<str>,
    method: Arc<str>,
}

impl RouteDescriptor {
    pub fn new(declaring_type: impl Into<Arc<str>>, method: impl Into<Arc<str>>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            method: method.into(),
        }
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring_type, self.method)
    }
}
