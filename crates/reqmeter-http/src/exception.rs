//! Handler failure reporting.
//!
//! A handler that fails attaches a `HandlerException` to its response. The
//! timing layer reads it back and uses it for the `exception` tag.

use std::convert::Infallible;

use axum::response::{IntoResponseParts, ResponseParts};

/// Exception tag value used when the handler panicked.
pub const PANIC_EXCEPTION: &str = "Panic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerException {
    kind: String,
}

impl HandlerException {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// Use the type name of `E` as the kind; the tag keeps its last segment.
    pub fn of<E: ?Sized>() -> Self {
        Self::new(std::any::type_name::<E>())
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl IntoResponseParts for HandlerException {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}
