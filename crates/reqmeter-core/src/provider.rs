//! Tag derivation for request timers.

use crate::lifecycle::RequestContext;
use crate::tags::{Tag, TagSet};

pub const TAG_METHOD: &str = "method";
pub const TAG_URI: &str = "uri";
pub const TAG_STATUS: &str = "status";
pub const TAG_EXCEPTION: &str = "exception";

/// Exception tag value for requests that completed without one.
pub const EXCEPTION_NONE: &str = "None";

pub const URI_NOT_FOUND: &str = "NOT_FOUND";
pub const URI_REDIRECTION: &str = "REDIRECTION";
pub const URI_ROOT: &str = "root";

/// Derives the tags for completed and in-flight request timers.
///
/// Implementations must be deterministic: registries look meters up by tag
/// equality.
pub trait TagsProvider: Send + Sync {
    /// Tags for a finished request (method, uri, status, exception).
    fn request_tags(&self, ctx: &RequestContext) -> TagSet;

    /// Tags for an in-flight request. Only match-time data is available.
    fn long_request_tags(&self, ctx: &RequestContext) -> TagSet;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTagsProvider;

impl TagsProvider for DefaultTagsProvider {
    fn request_tags(&self, ctx: &RequestContext) -> TagSet {
        [method(ctx), uri(ctx), status(ctx), exception(ctx)]
            .into_iter()
            .map(|t| (t.key, t.value))
            .collect()
    }

    fn long_request_tags(&self, ctx: &RequestContext) -> TagSet {
        [method(ctx), uri(ctx)]
            .into_iter()
            .map(|t| (t.key, t.value))
            .collect()
    }
}

pub fn method(ctx: &RequestContext) -> Tag {
    Tag::new(TAG_METHOD, ctx.method.to_ascii_uppercase())
}

/// Templated path. Redirects and not-founds collapse to fixed values.
pub fn uri(ctx: &RequestContext) -> Tag {
    match ctx.status {
        Some(s) if (300..400).contains(&s) => return Tag::new(TAG_URI, URI_REDIRECTION),
        Some(404) => return Tag::new(TAG_URI, URI_NOT_FOUND),
        _ => {}
    }
    let template = ctx.uri_template.trim();
    if template.is_empty() || template == "/" {
        return Tag::new(TAG_URI, URI_ROOT);
    }
    Tag::new(TAG_URI, collapse_slashes(template))
}

/// Status tag; a finished request with no status is reported as a server error.
pub fn status(ctx: &RequestContext) -> Tag {
    Tag::new(TAG_STATUS, ctx.status.unwrap_or(500).to_string())
}

pub fn exception(ctx: &RequestContext) -> Tag {
    let kind = ctx
        .exception
        .as_deref()
        .map(simple_name)
        .filter(|n| !n.is_empty())
        .unwrap_or(EXCEPTION_NONE);
    Tag::new(TAG_EXCEPTION, kind)
}

/// Last path segment of a type path, e.g. `my_app::errors::Conflict` -> `Conflict`.
pub fn simple_name(kind: &str) -> &str {
    let base = kind.split('<').next().unwrap_or(kind);
    base.rsplit("::").next().unwrap_or(base)
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_slash = false;
    for c in path.chars() {
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn finished(uri: &str, status: u16, exception: Option<&str>) -> RequestContext {
        RequestContext {
            method: "get".into(),
            uri_template: uri.into(),
            status: Some(status),
            exception: exception.map(str::to_string),
        }
    }

    #[test]
    fn completed_tags_are_deterministic() {
        let p = DefaultTagsProvider;
        let a = p.request_tags(&finished("/timed", 200, None));
        let b = p.request_tags(&finished("/timed", 200, None));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{exception=None, method=GET, status=200, uri=/timed}");
    }

    #[test]
    fn uri_collapses_for_redirects_and_not_found() {
        assert_eq!(uri(&finished("/users/:id", 302, None)).value, URI_REDIRECTION);
        assert_eq!(uri(&finished("/users/:id", 404, None)).value, URI_NOT_FOUND);
        assert_eq!(uri(&finished("/", 200, None)).value, URI_ROOT);
        assert_eq!(uri(&finished("//a//b", 200, None)).value, "/a/b");
    }

    #[test]
    fn exception_uses_simple_name() {
        let tag = exception(&finished("/x", 500, Some("app::errors::Conflict")));
        assert_eq!(tag.value, "Conflict");
        assert_eq!(simple_name("Vec<u8>"), "Vec");
    }

    #[test]
    fn long_request_tags_carry_no_outcome() {
        let ctx = RequestContext::matched("GET", "/long-timed");
        let tags = DefaultTagsProvider.long_request_tags(&ctx);
        assert_eq!(tags, TagSet::of([("method", "GET"), ("uri", "/long-timed")]));
    }
}
