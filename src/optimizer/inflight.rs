//! In-flight request table for coalescing identical concurrent lookups.
//!
//! Each entry holds a [`Shared`] handle to the task performing the fetch
//! for one [`RequestKey`]. Callers arriving while it is pending attach to
//! the same handle instead of starting another fetch, and therefore see
//! exactly that fetch's outcome.
//!
//! # Lifecycle
//!
//! ```text
//! join_or_start(key)
//!        │
//!        ├── live entry ─────────────► Attached(shared)
//!        │
//!        ├── entry dispatched longer
//!        │   than `stale_after` ─────► drop it, fall through
//!        │
//!        └── none ──► make(ticket) ──► Started(shared)
//!                         │
//!                         └── task arms the ticket into an InFlightGuard;
//!                             its drop removes the entry whether the
//!                             fetch succeeds, fails, or panics
//! ```
//!
//! Age is measured from the moment the fetch was dispatched, not from
//! registration: a request still queued behind the rate limiter has not
//! started talking to the provider yet and is never considered orphaned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tracing::warn;

use crate::Result;
use crate::cache::AnyValue;
use crate::key::RequestKey;

/// Shared handle to a pending fetch.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<AnyValue>>>;

type Entries = Arc<Mutex<HashMap<RequestKey, InFlight>>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
    dispatched_at: Arc<OnceLock<Instant>>,
}

impl InFlight {
    fn is_stale(&self, stale_after: Duration) -> bool {
        self.dispatched_at
            .get()
            .is_some_and(|at| at.elapsed() >= stale_after)
    }
}

/// Identity of a newly registered entry, handed to the code that starts
/// the fetch.
///
/// A ticket removes nothing by itself; the task running the fetch arms
/// it once it starts. `make` runs under the table lock, and a guard
/// dropped there would deadlock.
pub(crate) struct Ticket {
    entries: Entries,
    key: RequestKey,
    id: u64,
    dispatched_at: Arc<OnceLock<Instant>>,
}

impl Ticket {
    pub fn arm(self) -> InFlightGuard {
        InFlightGuard {
            entries: self.entries,
            key: self.key,
            id: self.id,
        }
    }

    /// Record that the fetch is now talking to the provider.
    pub fn mark_dispatched(&self) {
        let _ = self.dispatched_at.set(Instant::now());
    }
}

pub(crate) enum Joined {
    /// Coalesced onto an existing request.
    Attached(SharedFetch),
    /// This caller registered a new request.
    Started(SharedFetch),
}

pub(crate) struct InFlightTable {
    entries: Entries,
    next_id: AtomicU64,
    stale_after: Duration,
}

impl InFlightTable {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            stale_after,
        }
    }

    /// Attach to the live request for `key`, or register a new one built
    /// by `make`.
    ///
    /// Lookup and registration happen under one lock, so at most one
    /// entry per key exists at any instant.
    pub fn join_or_start<F>(&self, key: &RequestKey, make: F) -> Joined
    where
        F: FnOnce(Ticket) -> SharedFetch,
    {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = entries.get(key) {
            if !existing.is_stale(self.stale_after) {
                return Joined::Attached(existing.fetch.clone());
            }
            warn!(
                key = %key,
                stale_after_ms = self.stale_after.as_millis() as u64,
                "abandoning orphaned in-flight request"
            );
            entries.remove(key);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let dispatched_at = Arc::new(OnceLock::new());
        let ticket = Ticket {
            entries: Arc::clone(&self.entries),
            key: key.clone(),
            id,
            dispatched_at: Arc::clone(&dispatched_at),
        };
        let fetch = make(ticket);
        entries.insert(
            key.clone(),
            InFlight {
                id,
                fetch: fetch.clone(),
                dispatched_at,
            },
        );
        Joined::Started(fetch)
    }

    /// Number of registered requests.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Removes its in-flight entry on drop.
///
/// Only the entry it registered is removed: if that entry was abandoned
/// as stale and replaced, the replacement is left alone.
pub(crate) struct InFlightGuard {
    entries: Entries,
    key: RequestKey,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.get(&self.key).is_some_and(|e| e.id == self.id) {
            entries.remove(&self.key);
        }
    }
}
