//! Byte quota accounting and admission control.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::debug;

use crate::config::{OverflowStrategy, QuotaConfig};
use crate::eviction::EvictionEngine;
use crate::metrics;
use crate::notify::{Notification, Notifier};

/// Shared running total of stored bytes.
///
/// Seeded from the store at initialization and kept in step by every
/// store, delete, and eviction afterwards.
#[derive(Debug, Default)]
pub struct ByteLedger(AtomicU64);

impl ByteLedger {
    /// Current total.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Adds stored bytes.
    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Removes stored bytes, saturating at zero.
    pub fn subtract(&self, bytes: u64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(bytes);
            match self.0.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Replaces the total outright.
    pub fn set(&self, bytes: u64) {
        self.0.store(bytes, Ordering::Relaxed);
    }
}

/// Result of a quota admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaCheck {
    /// Whether the store may proceed.
    pub can_store: bool,
    /// Bytes stored at the time of the decision.
    pub usage: u64,
    /// Projected usage as a fraction of the quota.
    pub percentage: f64,
}

/// Quota usage as reported to administrative callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    /// Bytes currently stored.
    pub used: u64,
    /// Configured quota in bytes.
    pub max: u64,
    /// Usage as a percentage string, one decimal.
    pub percentage: String,
    /// Bytes remaining under the quota.
    pub available: u64,
}

/// Admission control against the configured byte quota.
///
/// With no quota configured every store is admitted and usage reports zero.
/// In the `[warning_threshold, 1)` band a [`Notification::QuotaWarning`] is
/// emitted on **every** check — deliberately not deduplicated. At or above
/// the cap the configured overflow strategy applies; note that `evict-lru`
/// frees the requested byte count and then admits unconditionally, with no
/// post-eviction re-check.
#[derive(Debug)]
pub struct QuotaManager {
    config: Option<QuotaConfig>,
    ledger: std::sync::Arc<ByteLedger>,
    notifier: Notifier,
}

impl QuotaManager {
    pub(crate) fn new(
        config: Option<QuotaConfig>,
        ledger: std::sync::Arc<ByteLedger>,
        notifier: Notifier,
    ) -> Self {
        QuotaManager {
            config,
            ledger,
            notifier,
        }
    }

    /// Bytes currently accounted for.
    pub fn current_bytes(&self) -> u64 {
        self.ledger.get()
    }

    /// Decides whether `additional_bytes` may be stored.
    pub(crate) async fn check(
        &self,
        additional_bytes: u64,
        eviction: &EvictionEngine,
    ) -> QuotaCheck {
        let Some(config) = &self.config else {
            return QuotaCheck {
                can_store: true,
                usage: 0,
                percentage: 0.0,
            };
        };

        let used = self.ledger.get();
        let projected = used + additional_bytes;
        let percentage = projected as f64 / config.max_bytes as f64;

        if percentage >= config.warning_threshold && percentage < 1.0 {
            debug!(
                percentage = format!("{:.1}", percentage * 100.0),
                "quota warning band"
            );
            metrics::increment_quota_warning();
            self.notifier.publish(Notification::QuotaWarning {
                percentage,
                used,
                max: config.max_bytes,
            });
        }

        if percentage >= 1.0 {
            return match config.on_exceeded {
                OverflowStrategy::EvictLru => {
                    eviction.evict_lru_bytes(additional_bytes).await;
                    QuotaCheck {
                        can_store: true,
                        usage: self.ledger.get(),
                        percentage,
                    }
                }
                OverflowStrategy::StopCaching => QuotaCheck {
                    can_store: false,
                    usage: used,
                    percentage,
                },
                OverflowStrategy::ClearAll => {
                    eviction.wipe_store().await;
                    QuotaCheck {
                        can_store: true,
                        usage: 0,
                        percentage: 0.0,
                    }
                }
            };
        }

        QuotaCheck {
            can_store: true,
            usage: used,
            percentage,
        }
    }

    /// Usage figures for the `quota` administrative operation.
    pub(crate) fn usage(&self) -> QuotaUsage {
        let max = self
            .config
            .as_ref()
            .map(|config| config.max_bytes)
            .unwrap_or(crate::config::DEFAULT_QUOTA_MAX_BYTES);
        let used = self.ledger.get();
        QuotaUsage {
            used,
            max,
            percentage: format!("{:.1}%", used as f64 / max as f64 * 100.0),
            available: max.saturating_sub(used),
        }
    }
}
