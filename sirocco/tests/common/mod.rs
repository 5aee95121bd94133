//! Shared test fixtures: a scripted mock fetcher and engine harness.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use sirocco::{Engine, EngineConfig, FetchError, FetchRequest, FetchResponse, Fetcher};
use sirocco_core::CacheRecord;
use sirocco_memory::InMemoryStore;

/// One scripted behavior for a URL.
#[derive(Debug, Clone)]
pub enum Script {
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
    Fail(String),
    Hang,
}

/// Fetcher driven by per-URL scripts.
///
/// Scripts queue per URL; each fetch pops the front entry, and the last
/// entry repeats once the queue is down to one.
#[derive(Debug, Default)]
pub struct MockFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    calls: Mutex<Vec<FetchRequest>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        MockFetcher::default()
    }

    pub fn script(&self, url: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_owned())
            .or_default()
            .push_back(script);
    }

    pub fn respond(&self, url: &str, status: u16, headers: &[(&str, &str)], body: &[u8]) {
        self.script(
            url,
            Script::Respond {
                status,
                headers: headers
                    .iter()
                    .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                    .collect(),
                body: Bytes::copy_from_slice(body),
            },
        );
    }

    pub fn fail(&self, url: &str) {
        self.script(url, Script::Fail("connection refused".to_owned()));
    }

    pub fn hang(&self, url: &str) {
        self.script(url, Script::Hang);
    }

    pub fn calls(&self) -> Vec<FetchRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push(request.clone());
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&request.url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match script {
            Some(Script::Respond {
                status,
                headers,
                body,
            }) => {
                let mut header_map = HeaderMap::new();
                for (name, value) in headers {
                    header_map.append(
                        HeaderName::from_bytes(name.as_bytes()).unwrap(),
                        HeaderValue::from_str(&value).unwrap(),
                    );
                }
                Ok(FetchResponse {
                    status: StatusCode::from_u16(status).unwrap(),
                    headers: header_map,
                    body,
                })
            }
            Some(Script::Fail(message)) => Err(FetchError::message(message)),
            Some(Script::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            None => Err(FetchError::message(format!(
                "no script for {}",
                request.url
            ))),
        }
    }
}

pub struct TestHarness {
    pub engine: Engine,
    pub store: Arc<InMemoryStore>,
    pub fetcher: Arc<MockFetcher>,
}

/// Builds an engine without initializing it, for tests that seed the store
/// first.
pub fn build(config: EngineConfig) -> TestHarness {
    let store = Arc::new(InMemoryStore::new());
    let fetcher = Arc::new(MockFetcher::new());
    let engine = Engine::new(config, store.clone(), fetcher.clone());
    TestHarness {
        engine,
        store,
        fetcher,
    }
}

/// Builds and initializes an engine.
pub async fn harness(config: EngineConfig) -> TestHarness {
    let harness = build(config);
    harness.engine.init().await.unwrap();
    harness
}

/// A stored record with explicit bookkeeping timestamps.
pub fn make_record(
    key: &str,
    body: &[u8],
    pattern: &str,
    valid_until: i64,
    last_access: i64,
    cached_at: i64,
) -> CacheRecord {
    let mut record = CacheRecord::new(
        key.to_owned(),
        StatusCode::OK,
        HeaderMap::new(),
        Bytes::copy_from_slice(body),
        valid_until,
        cached_at,
        pattern,
    );
    record.last_access = last_access;
    record
}
