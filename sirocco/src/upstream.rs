//! The network-fetch collaborator.
//!
//! The engine never opens connections itself; it calls a [`Fetcher`]
//! injected at construction. The engine's only cancellation point is here:
//! [`fetch_with_timeout`] bounds every call and aborts the in-flight fetch
//! by dropping its future when the budget runs out.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};

use crate::error::FetchError;

/// A request handed to the fetch collaborator.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body, when the method carries one.
    pub body: Option<Bytes>,
}

impl FetchRequest {
    /// Builds a request with empty headers and no body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        FetchRequest {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Builds a plain GET request.
    pub fn get(url: impl Into<String>) -> Self {
        FetchRequest::new(Method::GET, url)
    }

    /// Attaches a body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A response produced by the fetch collaborator.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Fully buffered response body.
    pub body: Bytes,
}

impl FetchResponse {
    /// Whether the status is in the success range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Performs plain and conditional GET-class requests on behalf of the
/// engine.
///
/// Implementations must be abortable: dropping the returned future must
/// cancel the underlying call, because that is exactly what the timeout
/// wrapper does.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Executes one request against the network.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Runs a fetch bounded by `timeout_ms`.
///
/// On expiry the in-flight future is dropped (aborting the call) and the
/// result is a [`FetchError::Timeout`], which every fallback strategy
/// treats as a plain network failure.
pub async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    request: FetchRequest,
    timeout_ms: u64,
) -> Result<FetchResponse, FetchError> {
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fetcher.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout_ms)),
    }
}
