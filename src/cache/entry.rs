//! Cache entries and their per-entry expiry policy.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::key::RequestKey;

/// Type-erased cached value. The optimizer downcasts it back to the
/// caller's result type on a hit.
pub(crate) type AnyValue = Arc<dyn Any + Send + Sync>;

/// A stored result together with its lifetime.
///
/// `expires_at` is always strictly after `stored_at`; an entry whose
/// `expires_at` has passed is never returned from a lookup.
#[derive(Clone)]
pub struct CacheEntry {
    pub(crate) value: AnyValue,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Returns `None` for a zero TTL, which could not satisfy
    /// `expires_at > stored_at`.
    pub(crate) fn new(value: AnyValue, ttl: Duration) -> Option<Self> {
        if ttl.is_zero() {
            return None;
        }
        let stored_at = Instant::now();
        Some(Self {
            value,
            stored_at,
            expires_at: stored_at + ttl,
        })
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn ttl(&self) -> Duration {
        self.expires_at - self.stored_at
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("stored_at", &self.stored_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Lets moka drop entries on its own once their TTL has elapsed.
///
/// Lookups still check `expires_at` themselves, so this only bounds
/// memory; it is not needed for correctness.
pub(crate) struct EntryExpiry;

impl moka::Expiry<RequestKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &RequestKey,
        value: &CacheEntry,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        Some(value.ttl())
    }

    // An overwrite restarts the clock with the new entry's TTL.
    fn expire_after_update(
        &self,
        _key: &RequestKey,
        value: &CacheEntry,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_is_rejected() {
        assert!(CacheEntry::new(Arc::new(1u32), Duration::ZERO).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_ttl() {
        let entry = CacheEntry::new(Arc::new("x"), Duration::from_secs(10)).unwrap();
        assert!(entry.expires_at > entry.stored_at);
        assert_eq!(entry.ttl(), Duration::from_secs(10));
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(entry.is_expired());
    }
}
