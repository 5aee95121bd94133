//! Engine responses.

use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use sirocco_core::CacheRecord;

use crate::upstream::FetchResponse;

/// Whether the response was served from cache, and in what state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a fresh cached record.
    Hit,
    /// Served from the network (or synthesized on failure).
    Miss,
    /// Served from a cached record past its freshness window.
    Stale,
}

impl CacheStatus {
    /// Returns the status as a string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Stale => "stale",
        }
    }
}

/// A response returned by the engine to the request originator.
#[derive(Debug, Clone)]
pub struct EngineResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response status text.
    pub status_text: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
    /// Where the response came from.
    pub cache_status: CacheStatus,
}

impl EngineResponse {
    /// Materializes a response from a stored record.
    pub(crate) fn from_record(record: &CacheRecord, cache_status: CacheStatus) -> Self {
        EngineResponse {
            status: record.status,
            status_text: record.status_text.clone(),
            headers: record.headers.clone(),
            body: record.body.clone(),
            cache_status,
        }
    }

    /// Wraps a network response.
    pub(crate) fn from_fetch(response: FetchResponse) -> Self {
        EngineResponse {
            status: response.status,
            status_text: response
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_owned(),
            headers: response.headers,
            body: response.body,
            cache_status: CacheStatus::Miss,
        }
    }

    /// The structured unavailable payload: a 503 with a JSON body, returned
    /// when the network failed and no servable record remains.
    pub(crate) fn unavailable(message: &str) -> Self {
        let body = serde_json::json!({
            "error": "Network request failed",
            "message": message,
        });
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        EngineResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            status_text: "Service Unavailable".to_owned(),
            headers,
            body: Bytes::from(body.to_string()),
            cache_status: CacheStatus::Miss,
        }
    }
}
