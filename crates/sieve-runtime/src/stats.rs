//! Run statistics for a classification session.
//!
//! Counters are atomics so tasks record without contending; token usage
//! sits behind a lock because it is updated field by field.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::providers::TokenUsage;

/// Accumulated token usage across external calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Prompt/input tokens
    pub prompt_tokens: u64,

    /// Completion/output tokens
    pub completion_tokens: u64,

    /// Total tokens used
    pub total_tokens: u64,
}

impl UsageTotals {
    /// Add token usage from one response.
    pub fn add(&mut self, usage: &TokenUsage) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
    }
}

/// Live counters for a session.
#[derive(Default)]
pub struct RunStats {
    items: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced: AtomicU64,
    external_calls: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
    flagged: AtomicU64,
    usage: RwLock<UsageTotals>,
}

impl RunStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_item(&self) {
        self.items.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one call to the service.
    pub(crate) fn record_call(&self, is_retry: bool) {
        self.external_calls.fetch_add(1, Ordering::Relaxed);
        if is_retry {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flagged(&self) {
        self.flagged.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_usage(&self, usage: &TokenUsage) {
        self.usage.write().add(usage);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            items: self.items.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            external_calls: self.external_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            flagged_for_validation: self.flagged.load(Ordering::Relaxed),
            usage: *self.usage.read(),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.items,
            &self.cache_hits,
            &self.cache_misses,
            &self.coalesced,
            &self.external_calls,
            &self.retries,
            &self.failures,
            &self.flagged,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self.usage.write() = UsageTotals::default();
    }
}

/// Serializable counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Items submitted
    pub items: u64,

    /// Served from cache without waiting
    pub cache_hits: u64,

    /// Not in cache on first lookup
    pub cache_misses: u64,

    /// Misses answered by a concurrent request for the same key
    pub coalesced: u64,

    /// Calls made to the service, retries included
    pub external_calls: u64,

    /// Calls beyond the first for an item
    pub retries: u64,

    /// Items that ended in an error
    pub failures: u64,

    /// Results routed to manual validation
    pub flagged_for_validation: u64,

    /// Token usage
    pub usage: UsageTotals,
}

impl StatsSnapshot {
    /// Share of items answered without an external call.
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            return 0.0;
        }
        (self.cache_hits + self.coalesced) as f64 / lookups as f64
    }
}
