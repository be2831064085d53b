//! Caching layer for sieve-runtime.
//!
//! Stores classification results by [`CacheKey`] so an article seen before
//! (in any casing or punctuation) costs no external call.
//!
//! - Capacity bound with least-recently-used eviction
//! - Time-to-live expiry, purged lazily on lookup
//! - One lock around all state, so lookup/insert/evict are atomic

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use sieve_core::{CacheKey, ClassificationResult};

struct CacheEntry {
    result: ClassificationResult,
    stored_at: Instant,
    /// Position in the recency order
    tick: u64,
}

/// Key index plus recency order. Smallest tick is least recently used.
#[derive(Default)]
struct LruState {
    entries: HashMap<CacheKey, CacheEntry>,
    recency: BTreeMap<u64, CacheKey>,
    next_tick: u64,
    stats: CacheStats,
}

impl LruState {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Cache counters since construction (or last `clear`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

/// Bounded result store with TTL expiry and LRU eviction.
pub struct CacheStore {
    state: Mutex<LruState>,
    capacity: usize,
    ttl: Duration,
}

impl CacheStore {
    /// Create a store. A capacity of zero disables storage.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            capacity,
            ttl,
        }
    }

    /// Look up a live result.
    ///
    /// An expired entry is removed and reported as absent. A live entry
    /// becomes the most recently used; its age is unchanged.
    pub fn get(&self, key: &CacheKey) -> Option<ClassificationResult> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let Some(stored_at) = state.entries.get(key).map(|entry| entry.stored_at) else {
            state.stats.misses += 1;
            return None;
        };

        if now.duration_since(stored_at) >= self.ttl {
            state.remove(key);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            tracing::trace!(key = %key.short(), "Cache entry expired");
            return None;
        }

        let tick = state.bump();
        let state = &mut *state;
        let entry = state.entries.get_mut(key)?;
        state.recency.remove(&entry.tick);
        entry.tick = tick;
        state.recency.insert(tick, key.clone());
        state.stats.hits += 1;
        Some(entry.result.clone())
    }

    /// Insert or replace a result.
    ///
    /// When inserting a new key into a full store, the least recently used
    /// entry is evicted first.
    pub fn put(&self, key: CacheKey, result: ClassificationResult) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.state.lock();
        if state.remove(&key).is_none() {
            while state.entries.len() >= self.capacity {
                match state.evict_lru() {
                    Some(evicted) => {
                        state.stats.evictions += 1;
                        tracing::debug!(key = %evicted.short(), "Evicted least recently used entry");
                    }
                    None => break,
                }
            }
        }

        let tick = state.bump();
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            CacheEntry {
                result,
                stored_at: Instant::now(),
                tick,
            },
        );
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn size(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Drop every entry and reset counters.
    pub fn clear(&self) {
        *self.state.lock() = LruState::default();
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(24 * 60 * 60))
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("size", &self.size())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}
