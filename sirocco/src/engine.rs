//! Engine assembly and lifecycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use http::{HeaderValue, header};
use sirocco_backend::{PutStatus, RecordStore};
use sirocco_core::{
    CacheRecord, ResponseMetadata, RuleSet, guess_content_type, now_ms, ttl,
};
use smol_str::SmolStr;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::control::{Command, CommandReply, ControlRequest, Controller};
use crate::eager;
use crate::error::EngineError;
use crate::eviction::EvictionEngine;
use crate::manifest;
use crate::notify::{Notification, Notifier};
use crate::offload::TaskTracker;
use crate::quota::{ByteLedger, QuotaManager, QuotaUsage};
use crate::response::EngineResponse;
use crate::revalidate;
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::upstream::{FetchRequest, FetchResponse, Fetcher};

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed but not initialized; requests are declined.
    Uninitialized,
    /// Running initialization work (precache).
    Installing,
    /// Serving requests and administrative commands.
    Active,
}

/// Locks a mutex, recovering from poisoning instead of panicking.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) rules: RuleSet,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) stats: Arc<StatsCollector>,
    pub(crate) ledger: Arc<ByteLedger>,
    pub(crate) quota: QuotaManager,
    pub(crate) eviction: EvictionEngine,
    pub(crate) notifier: Notifier,
    /// Transient fire-and-forget work (background revalidation).
    pub(crate) tasks: TaskTracker,
    /// Long-lived loops (control channel, manifest poller).
    pub(crate) services: TaskTracker,
    pub(crate) phase: Mutex<Phase>,
    pub(crate) debug_mode: AtomicBool,
    pub(crate) manifest_version: Mutex<Option<String>>,
    pub(crate) control_sender: Mutex<Option<mpsc::Sender<ControlRequest>>>,
}

/// The caching engine.
///
/// One owned instance holds all mutable state — configuration, stats,
/// quota ledger, poller handles; there are no ambient globals. Construct
/// with [`Engine::new`], bring up with [`Engine::init`], tear down with
/// [`Engine::shutdown`].
///
/// Cloning is cheap and shares the instance.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Assembles an engine from configuration and its two collaborators:
    /// the persistent record store and the network fetcher.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let rules = RuleSet::compile(config.rules.clone());
        let stats = Arc::new(StatsCollector::default());
        let ledger = Arc::new(ByteLedger::default());
        let notifier = Notifier::default();
        let eviction = EvictionEngine::new(store.clone(), stats.clone(), ledger.clone());
        let quota = QuotaManager::new(config.quota.clone(), ledger.clone(), notifier.clone());

        Engine {
            inner: Arc::new(EngineInner {
                config,
                rules,
                store,
                fetcher,
                stats,
                ledger,
                quota,
                eviction,
                notifier,
                tasks: TaskTracker::new(),
                services: TaskTracker::new(),
                phase: Mutex::new(Phase::Uninitialized),
                debug_mode: AtomicBool::new(false),
                manifest_version: Mutex::new(None),
                control_sender: Mutex::new(None),
            }),
        }
    }

    /// Initializes the engine: sizes the ledger from the store, runs
    /// precache, opens the control channel, and starts the manifest
    /// poller.
    ///
    /// Configuration problems degrade rather than fail: an empty rule list
    /// or uncompilable patterns are logged and the affected rules simply
    /// never match. The only initialization failure is a precache run that
    /// is configured not to fail silently.
    pub async fn init(&self) -> Result<(), EngineError> {
        {
            let mut phase = lock(&self.inner.phase);
            if *phase != Phase::Uninitialized {
                return Err(EngineError::InvalidConfig(
                    "engine already initialized".to_owned(),
                ));
            }
            *phase = Phase::Installing;
        }

        if self.inner.rules.is_empty() {
            error!("configuration has no rules; requests will never match");
        }
        for rule in self.inner.rules.iter() {
            if !rule.is_valid() {
                // Already warned at compile; restated here so a degraded
                // init is visible in one place.
                warn!(pattern = %rule.rule.pattern, "rule is permanently non-matching");
            }
        }

        match self.inner.store.total_bytes().await {
            Ok(bytes) => self.inner.ledger.set(bytes),
            Err(store_error) => {
                warn!(error = %store_error, "could not size existing store");
                self.inner.stats.record_error();
            }
        }

        if let Some(precache) = self
            .inner
            .config
            .eager
            .as_ref()
            .and_then(|eager| eager.precache.clone())
            && !precache.urls.is_empty()
            && let Err(precache_error) = eager::run_precache(&self.inner, &precache).await
        {
            *lock(&self.inner.phase) = Phase::Uninitialized;
            return Err(precache_error);
        }

        let (sender, receiver) = mpsc::channel(32);
        *lock(&self.inner.control_sender) = Some(sender);
        let control_inner = Arc::clone(&self.inner);
        self.inner
            .services
            .spawn("control", crate::control::run_loop(control_inner, receiver));

        *lock(&self.inner.phase) = Phase::Active;
        debug!(rules = self.inner.rules.len(), "engine active");

        if let Some(manifest_config) = self.inner.config.invalidation.manifest.clone() {
            // Initial poll happens inline at activation; failures are
            // logged and the poller keeps its schedule regardless.
            manifest::poll_once(&self.inner, &manifest_config).await;
            let poll_inner = Arc::clone(&self.inner);
            self.inner.services.spawn("manifest-poll", async move {
                let interval = Duration::from_millis(manifest_config.interval_ms);
                loop {
                    tokio::time::sleep(interval).await;
                    manifest::poll_once(&poll_inner, &manifest_config).await;
                }
            });
        }

        Ok(())
    }

    /// Tears the engine down: closes the control channel and aborts the
    /// poller and any in-flight background work. Storage operations
    /// already issued run to completion on their own tasks' last poll;
    /// nothing new is started.
    pub fn shutdown(&self) {
        *lock(&self.inner.phase) = Phase::Uninitialized;
        *lock(&self.inner.control_sender) = None;
        self.inner.services.cancel_all();
        self.inner.tasks.cancel_all();
        debug!("engine shut down");
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *lock(&self.inner.phase)
    }

    /// Handles one intercepted request.
    ///
    /// Returns `Ok(None)` when the engine declines (no matching rule, or
    /// not active) — the originator should go to the network itself.
    /// Errors surface only where the matched rule's strategy demands it
    /// (`network-only`); everything else becomes a fallback response or
    /// the structured unavailable payload.
    pub async fn handle(
        &self,
        request: FetchRequest,
    ) -> Result<Option<EngineResponse>, EngineError> {
        if self.phase() != Phase::Active {
            debug!(url = %request.url, "engine not active; declining request");
            return Ok(None);
        }
        let Some(rule) = self.inner.rules.matching(&request.url, &request.method) else {
            return Ok(None);
        };
        let rule = rule.clone();
        revalidate::run(&self.inner, request, &rule).await.map(Some)
    }

    /// Executes an administrative command directly (the control channel
    /// calls the same path).
    pub async fn execute(&self, command: Command) -> CommandReply {
        self.inner.execute_command(command).await
    }

    /// Returns a client handle for the control channel.
    ///
    /// Before [`Engine::init`] (or after shutdown) the controller has no
    /// active channel and every send fails fast with a precondition error.
    pub fn controller(&self) -> Controller {
        Controller::new(lock(&self.inner.control_sender).clone())
    }

    /// Subscribes to engine notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifier.subscribe()
    }

    /// Engine counters.
    pub fn stats(&self) -> &StatsCollector {
        &self.inner.stats
    }

    /// Waits for in-flight background revalidations to finish. Test and
    /// shutdown aid; the request path never waits on these.
    pub async fn wait_background(&self) {
        self.inner.tasks.wait_all().await;
    }
}

impl EngineInner {
    /// Whether verbose (debug-toggled) logging is on.
    pub(crate) fn verbose(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    pub(crate) async fn execute_command(self: &Arc<Self>, command: Command) -> CommandReply {
        match command {
            Command::Clear => CommandReply::Cleared(self.clear_all().await),
            Command::ClearPattern { pattern } => {
                CommandReply::PatternCleared(self.clear_pattern(&pattern).await)
            }
            Command::InvalidateUrl { url } => {
                CommandReply::UrlInvalidated(self.invalidate_url(&url).await)
            }
            Command::Stats => CommandReply::Stats(self.stats_snapshot().await),
            Command::Quota => CommandReply::Quota(self.quota_usage()),
            Command::Debug => CommandReply::Debug {
                debug_mode: self.toggle_debug(),
            },
            Command::Prefetch { url } => CommandReply::Prefetch(eager::prefetch(self, &url).await),
        }
    }

    /// Writes a fetched response into the store, quota-checked, with byte
    /// accounting and optional per-pattern limit enforcement. Returns
    /// whether the record was persisted.
    pub(crate) async fn persist_response(
        &self,
        key: &SmolStr,
        url: &str,
        response: &FetchResponse,
        metadata: ResponseMetadata,
        ttl_minutes: f64,
        pattern: &str,
        enforce_max_entries: Option<usize>,
    ) -> bool {
        let body_size = response.body.len() as u64;
        let check = self.quota.check(body_size, &self.eviction).await;
        if !check.can_store {
            debug!(%url, "quota rejected store");
            return false;
        }

        let mut headers = response.headers.clone();
        headers.remove(header::SET_COOKIE);
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(guess_content_type(url)),
            );
        }

        let now = now_ms();
        let mut record = CacheRecord::new(
            key.clone(),
            response.status,
            headers,
            response.body.clone(),
            ttl::valid_until(now, ttl_minutes),
            now,
            pattern,
        );
        record.etag = metadata.etag;
        record.last_modified = metadata.last_modified;
        record.must_revalidate = metadata.must_revalidate;
        record.cache_version = metadata.cache_version;
        let size = record.size;

        match self.store.put(record).await {
            Ok(PutStatus::Created) => self.ledger.add(size),
            Ok(PutStatus::Replaced { previous_size }) => {
                self.ledger.add(size);
                self.ledger.subtract(previous_size);
            }
            Err(store_error) => {
                debug!(%url, error = %store_error, "storing response failed");
                self.stats.record_error();
                return false;
            }
        }
        if self.verbose() {
            debug!(%key, size, "stored in cache");
        }

        if let Some(max_entries) = enforce_max_entries {
            self.eviction.enforce_pattern_limit(pattern, max_entries).await;
        }
        true
    }

    async fn clear_all(&self) -> bool {
        match self.store.clear().await {
            Ok(()) => {
                self.ledger.set(0);
                debug!("cache cleared");
                true
            }
            Err(store_error) => {
                debug!(error = %store_error, "clearing cache failed");
                self.stats.record_error();
                false
            }
        }
    }

    async fn clear_pattern(&self, pattern: &str) -> u64 {
        let Ok(regex) = regex::Regex::new(pattern) else {
            debug!(%pattern, "clear pattern did not compile");
            return 0;
        };
        match self
            .store
            .delete_matching(&|key| regex.is_match(key))
            .await
        {
            Ok(deleted) => {
                self.resync_ledger().await;
                debug!(%pattern, deleted, "cleared records by pattern");
                deleted
            }
            Err(store_error) => {
                debug!(%pattern, error = %store_error, "pattern clear failed");
                self.stats.record_error();
                0
            }
        }
    }

    async fn invalidate_url(&self, url: &str) -> bool {
        match self.store.delete(url).await {
            Ok(sirocco_backend::DeleteStatus::Deleted(_)) => {
                self.resync_ledger().await;
                true
            }
            Ok(sirocco_backend::DeleteStatus::Missing) => false,
            Err(store_error) => {
                debug!(%url, error = %store_error, "invalidating record failed");
                self.stats.record_error();
                false
            }
        }
    }

    async fn stats_snapshot(&self) -> StatsSnapshot {
        let entries = match self.store.count().await {
            Ok(count) => count,
            Err(store_error) => {
                debug!(error = %store_error, "counting records failed");
                self.stats.record_error();
                0
            }
        };
        self.stats
            .snapshot(entries, self.ledger.get(), self.config.eager.is_some())
    }

    fn quota_usage(&self) -> QuotaUsage {
        self.quota.usage()
    }

    fn toggle_debug(&self) -> bool {
        // fetch_xor returns the previous value; the new one is its negation.
        !self.debug_mode.fetch_xor(true, Ordering::Relaxed)
    }

    /// Re-derives the byte ledger from the store after deletes whose freed
    /// sizes the engine did not track record by record.
    async fn resync_ledger(&self) {
        match self.store.total_bytes().await {
            Ok(bytes) => self.ledger.set(bytes),
            Err(store_error) => {
                debug!(error = %store_error, "resyncing byte ledger failed");
                self.stats.record_error();
            }
        }
    }
}
