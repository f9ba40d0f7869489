//! Bounded, time-expiring key/value cache.
//!
//! Reads share a lock; `set`, eviction and sweeps take it exclusively. Expiry
//! is enforced lazily on `get` and eagerly by [`CacheJanitor`](super::CacheJanitor).
//! Capacity eviction removes expired entries first and then the oldest
//! *inserted* entries. Reads never refresh an entry's age, so this is
//! insertion-order eviction, not LRU.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::models::Order;

/// Cache of order aggregates keyed by `order_uid`
pub type OrderCache = TtlCache<Order>;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    /// Monotonic per-cache insertion counter; breaks timestamp ties and
    /// identifies the exact write an entry came from.
    sequence: u64,
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_sequence: u64,
}

pub struct TtlCache<V> {
    state: RwLock<CacheState<V>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V> fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("len", &self.state.read().entries.len())
            .finish()
    }
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache.
    ///
    /// A zero `ttl` disables expiry and a zero `max_entries` disables the
    /// capacity bound.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                next_sequence: 0,
            }),
            ttl,
            max_entries,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Look up `key`.
    ///
    /// An entry older than the TTL is a miss and is removed, unless it was
    /// overwritten between the read and the removal.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let stale_sequence = {
            let state = self.state.read();
            let entry = state.entries.get(key)?;
            if !self.is_expired(entry, now) {
                return Some(entry.value.clone());
            }
            entry.sequence
        };

        self.remove_if_unchanged(key, stale_sequence);
        None
    }

    /// Store `value` under `key` stamped with the current time, then enforce
    /// the capacity bound.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let now = Instant::now();
        let mut state = self.state.write();

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: now,
                sequence,
            },
        );

        if self.max_entries > 0 && state.entries.len() > self.max_entries {
            self.evict_over_capacity(&mut state, now);
        }
    }

    /// Remove every entry older than the TTL, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_zero() {
            return 0;
        }
        let now = Instant::now();
        let mut state = self.state.write();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !self.is_expired(entry, now));
        before - state.entries.len()
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        !self.ttl.is_zero() && now.saturating_duration_since(entry.inserted_at) > self.ttl
    }

    fn remove_if_unchanged(&self, key: &str, sequence: u64) -> bool {
        let mut state = self.state.write();
        match state.entries.get(key) {
            Some(entry) if entry.sequence == sequence => {
                state.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    fn evict_over_capacity(&self, state: &mut CacheState<V>, now: Instant) {
        let before = state.entries.len();

        if !self.ttl.is_zero() {
            state.entries.retain(|_, entry| !self.is_expired(entry, now));
        }

        let excess = state.entries.len().saturating_sub(self.max_entries);
        if excess > 0 {
            let mut by_age: Vec<(Instant, u64, String)> = state
                .entries
                .iter()
                .map(|(key, entry)| (entry.inserted_at, entry.sequence, key.clone()))
                .collect();
            by_age.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

            for (_, _, key) in by_age.into_iter().take(excess) {
                state.entries.remove(&key);
            }
        }

        debug!(
            evicted = before - state.entries.len(),
            remaining = state.entries.len(),
            max_entries = self.max_entries,
            "Cache over capacity, evicted entries"
        );
    }
}
