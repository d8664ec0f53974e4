//! Response cache.
//!
//! [`ResponseCache`] stores the last successful result per
//! [`RequestKey`], each with its own TTL chosen by the caller of
//! [`RequestOptimizer::run`](crate::RequestOptimizer::run).
//!
//! # Architecture
//!
//! Backed by moka's async cache with a per-entry [`moka::Expiry`] policy
//! and a capacity bound. Entry timestamps use `tokio::time::Instant`, and
//! every lookup re-checks `expires_at` itself, so an expired entry is
//! never served even before moka gets around to evicting it. Lookups never
//! evict; removal is left to the periodic sweep.
//!
//! Failed fetches never touch the cache: a previous good value stays in
//! place until it expires or is overwritten by the next success.

mod entry;

pub use entry::CacheEntry;
pub(crate) use entry::AnyValue;

use std::time::Duration;

use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use tokio::time::Instant;
use tracing::debug;

use crate::key::RequestKey;
use entry::EntryExpiry;

/// Default maximum number of entries in the response cache.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// In-memory TTL cache keyed on canonical request keys.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<RequestKey, CacheEntry>,
}

impl ResponseCache {
    /// Create an empty cache holding at most `max_entries` results.
    pub fn new(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .build();
        Self { entries }
    }

    /// Look up a live entry.
    ///
    /// An entry found past its `expires_at` is reported as a miss but left
    /// in place: a concurrent fetch may already have replaced it, and the
    /// sweep (or moka's own expiry) removes it otherwise.
    pub async fn get(&self, key: &RequestKey) -> Option<CacheEntry> {
        self.entries
            .get(key)
            .await
            .filter(|entry| !entry.is_expired())
    }

    /// Store (or overwrite) the result for `key`.
    ///
    /// A zero `ttl` stores nothing.
    pub(crate) async fn insert(&self, key: RequestKey, value: AnyValue, ttl: Duration) {
        match CacheEntry::new(value, ttl) {
            Some(entry) => self.entries.insert(key, entry).await,
            None => debug!(key = %key, "zero ttl, result not cached"),
        }
    }

    /// Number of entries that have not yet expired.
    pub fn live_entries(&self) -> u64 {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .count() as u64
    }

    /// Remove every expired entry. Returns how many were removed.
    ///
    /// Each removal re-checks expiry atomically, so a key refreshed after
    /// the scan keeps its new entry.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let candidates: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0;
        for key in &candidates {
            let outcome = self
                .entries
                .entry_by_ref(key.as_ref())
                .and_compute_with(|current| {
                    let expired = current.is_some_and(|e| e.value().is_expired_at(now));
                    std::future::ready(if expired { Op::Remove } else { Op::Nop })
                })
                .await;
            if matches!(outcome, CompResult::Removed(_)) {
                removed += 1;
            }
        }
        self.entries.run_pending_tasks().await;
        removed
    }

    /// Stored entries, expired or not, once pending removals have applied.
    #[cfg(test)]
    pub(crate) async fn stored_entries(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
