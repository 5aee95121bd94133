//! Response metadata extraction.
//!
//! [`ResponseMetadata`] condenses the caching-relevant response headers into
//! plain facts the TTL policy and revalidation logic consume: validators
//! (`ETag`, `Last-Modified`), freshness lifetimes (`Cache-Control`
//! directives, `Expires`), and the hard `no-store` switch.

use chrono::DateTime;
use http::{HeaderMap, StatusCode, header};

use crate::EpochMs;

/// Cache-control facts extracted from a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// `ETag` validator, verbatim.
    pub etag: Option<String>,
    /// `Last-Modified` validator, verbatim.
    pub last_modified: Option<String>,
    /// `Cache-Control: max-age` in seconds.
    pub max_age: Option<u64>,
    /// `Cache-Control: s-maxage` in seconds.
    pub s_max_age: Option<u64>,
    /// `Expires` parsed to epoch milliseconds; unparsable dates yield `None`.
    pub expires: Option<EpochMs>,
    /// `Cache-Control: no-store`.
    pub no_store: bool,
    /// `Cache-Control: must-revalidate` or `no-cache`.
    pub must_revalidate: bool,
    /// Value of the configured version header, captured at store time when
    /// header-based invalidation is in use.
    pub cache_version: Option<String>,
}

impl ResponseMetadata {
    /// Extracts metadata from response headers.
    pub fn extract(headers: &HeaderMap) -> Self {
        let cache_control = headers
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(parse_cache_control)
            .unwrap_or_default();

        ResponseMetadata {
            etag: header_string(headers, header::ETAG),
            last_modified: header_string(headers, header::LAST_MODIFIED),
            max_age: cache_control.max_age,
            s_max_age: cache_control.s_max_age,
            expires: headers
                .get(header::EXPIRES)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_expires),
            no_store: cache_control.no_store,
            must_revalidate: cache_control.must_revalidate || cache_control.no_cache,
            cache_version: None,
        }
    }

    /// Returns `self` with the configured version header captured from the
    /// response, when present.
    pub fn with_version_from(mut self, headers: &HeaderMap, version_header: &str) -> Self {
        self.cache_version = headers
            .get(version_header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self
    }
}

#[derive(Debug, Default)]
struct CacheControl {
    max_age: Option<u64>,
    s_max_age: Option<u64>,
    no_store: bool,
    no_cache: bool,
    must_revalidate: bool,
}

/// Parses `Cache-Control` as comma-separated `name[=value]` tokens with
/// case-insensitive names. Unknown directives are ignored.
fn parse_cache_control(value: &str) -> CacheControl {
    let mut parsed = CacheControl::default();
    for token in value.split(',') {
        let token = token.trim();
        let (name, directive_value) = match token.split_once('=') {
            Some((name, value)) => (name, Some(value.trim())),
            None => (token, None),
        };
        match name.to_ascii_lowercase().as_str() {
            "max-age" => parsed.max_age = directive_value.and_then(|v| v.parse().ok()),
            "s-maxage" => parsed.s_max_age = directive_value.and_then(|v| v.parse().ok()),
            "no-store" => parsed.no_store = true,
            "no-cache" => parsed.no_cache = true,
            "must-revalidate" => parsed.must_revalidate = true,
            _ => {}
        }
    }
    parsed
}

/// Parses an `Expires` header (HTTP-date) to epoch milliseconds.
fn parse_expires(value: &str) -> Option<EpochMs> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.timestamp_millis())
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Whether a response may be stored at all.
///
/// Success status, no `no-store` directive, and no `Set-Cookie` — responses
/// that set cookies are per-client and never shared through the cache.
pub fn cacheable(status: StatusCode, headers: &HeaderMap, metadata: &ResponseMetadata) -> bool {
    status.is_success() && !metadata.no_store && !headers.contains_key(header::SET_COOKIE)
}

/// Guesses a `Content-Type` from the URL's file extension.
///
/// Used when a stored response carries no `Content-Type` of its own.
pub fn guess_content_type(url: &str) -> &'static str {
    let extension = url
        .rsplit('.')
        .next()
        .map(|tail| {
            tail.split(|c| c == '#' || c == '?')
                .next()
                .unwrap_or(tail)
        })
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "css" => "text/css",
        "html" => "text/html",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
