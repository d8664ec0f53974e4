//! Request optimizer: cache, rate limiter and in-flight coalescing in
//! front of arbitrary remote lookups.
//!
//! # Request flow
//!
//! ```text
//! run(category, params, fetch, ttl)
//!          │
//!          ▼
//!   ┌──────────────┐  hit
//!   │ ResponseCache│──────────────────────────────► value
//!   └──────┬───────┘
//!          │ miss
//!          ▼
//!   ┌──────────────┐  live entry
//!   │ InFlightTable│──────────────► await shared ─► value / error
//!   └──────┬───────┘
//!          │ none (or orphaned)
//!          ▼
//!   spawn fetch task:
//!     RateLimiter::acquire(category)   ◄── waits, never rejects
//!     fetch()                          ◄── exactly once
//!     Ok  → cache.insert(key, ttl)
//!     Err → nothing cached
//!     drop guard → in-flight entry removed
//! ```
//!
//! The fetch runs on its own task, so it completes (and releases its
//! in-flight entry) even if every waiting caller goes away. There is no
//! cancellation and no timeout here; a timeout belongs to the fetch.

pub mod config;
pub(crate) mod inflight;
pub mod rate_limit;

pub use config::OptimizerConfig;
pub use rate_limit::RateLimiter;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{AnyValue, ResponseCache};
use crate::key::RequestKey;
use crate::telemetry;
use crate::{Result, WayfareError};
use config::MIN_TICK;
use inflight::{InFlightTable, Joined, SharedFetch, Ticket};

/// Snapshot of optimizer state, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Cached results that have not expired.
    pub total_items: u64,
    /// Requests started per category within the current rate window.
    pub request_counts: BTreeMap<String, usize>,
    /// Requests currently in flight.
    pub in_flight: usize,
}

struct Inner {
    config: OptimizerConfig,
    cache: ResponseCache,
    limiter: RateLimiter,
    in_flight: InFlightTable,
}

/// Single choke point for remote lookups.
///
/// Construct one per process and hand clones to every service that talks
/// to a rate-limited provider. Clones share all state.
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use wayfare::{OptimizerConfig, RequestOptimizer};
/// # async fn example() -> wayfare::Result<()> {
/// let optimizer = RequestOptimizer::new(OptimizerConfig::default());
/// let forecast: String = optimizer
///     .run(
///         "weather",
///         &("Kuala Lumpur", "metric"),
///         || async { Ok("31°C, scattered showers".to_string()) },
///         Duration::from_secs(600),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RequestOptimizer {
    inner: Arc<Inner>,
}

impl RequestOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        let inner = Inner {
            cache: ResponseCache::new(config.max_cache_entries),
            limiter: RateLimiter::new(&config),
            in_flight: InFlightTable::new(config.in_flight_stale_after),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.inner.config
    }

    /// Run `fetch` through the cache, the in-flight table and the rate
    /// limiter.
    ///
    /// `params` identify the request within `category`; two calls with
    /// equal canonical params share a cache entry and coalesce while in
    /// flight. `fetch` is invoked at most once per call, and not at all on
    /// a cache hit or when attaching to an identical pending request.
    ///
    /// Errors from `fetch` reach every attached caller unchanged and are
    /// never cached.
    pub async fn run<P, F, Fut, T>(
        &self,
        category: &str,
        params: &P,
        fetch: F,
        ttl: Duration,
    ) -> Result<T>
    where
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let key = RequestKey::new(category, params)?;

        if let Some(entry) = self.inner.cache.get(&key).await {
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "category" => category.to_owned())
                .increment(1);
            debug!(key = %key, "cache hit");
            return downcast(&key, entry.value);
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "category" => category.to_owned())
            .increment(1);

        let joined = self.inner.in_flight.join_or_start(&key, |ticket| {
            self.spawn_fetch(key.clone(), ticket, fetch, ttl)
        });
        let shared = match joined {
            Joined::Attached(shared) => {
                metrics::counter!(telemetry::DEDUP_ATTACHED_TOTAL, "category" => category.to_owned())
                    .increment(1);
                debug!(key = %key, "attached to in-flight request");
                shared
            }
            Joined::Started(shared) => shared,
        };

        let value = shared.await?;
        downcast(&key, value)
    }

    /// Start the task that performs one fetch for `key`.
    fn spawn_fetch<F, Fut, T>(
        &self,
        key: RequestKey,
        ticket: Ticket,
        fetch: F,
        ttl: Duration,
    ) -> SharedFetch
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let category = key.category().to_owned();

            // Another fetch may have filled the cache between our miss and
            // registration.
            if let Some(entry) = inner.cache.get(&key).await {
                drop(ticket.arm());
                return Ok(entry.value);
            }

            inner.limiter.acquire(&category).await;
            ticket.mark_dispatched();
            let _guard = ticket.arm();

            debug!(key = %key, "dispatching fetch");
            let started = Instant::now();
            let outcome = fetch().await;
            metrics::histogram!(telemetry::FETCH_DURATION_SECONDS, "category" => category.clone())
                .record(started.elapsed().as_secs_f64());

            match outcome {
                Ok(value) => {
                    metrics::counter!(telemetry::FETCHES_TOTAL,
                        "category" => category,
                        "status" => "ok",
                    )
                    .increment(1);
                    let value: AnyValue = Arc::new(value);
                    inner.cache.insert(key, Arc::clone(&value), ttl).await;
                    Ok(value)
                }
                Err(e) => {
                    metrics::counter!(telemetry::FETCHES_TOTAL,
                        "category" => category,
                        "status" => "error",
                    )
                    .increment(1);
                    warn!(key = %key, error = %e, "fetch failed");
                    Err(e)
                }
            }
        });

        async move {
            handle
                .await
                .map_err(|e| WayfareError::TaskFailed(e.to_string()))?
        }
        .boxed()
        .shared()
    }

    /// Introspection only; no side effects on cache contents.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            total_items: self.inner.cache.live_entries(),
            request_counts: self.inner.limiter.window_counts().into_iter().collect(),
            in_flight: self.inner.in_flight.len(),
        }
    }

    /// Drop every cached result. Rate windows and in-flight requests are
    /// unaffected.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
        debug!("response cache cleared");
    }

    /// Start the periodic expiry sweep.
    ///
    /// The task holds only a weak reference and exits once the last
    /// optimizer handle is dropped.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval.max(MIN_TICK);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let removed = inner.cache.sweep_expired().await;
                metrics::counter!(telemetry::CACHE_SWEPT_TOTAL).increment(removed as u64);
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        })
    }
}

fn downcast<T: Clone + Send + Sync + 'static>(key: &RequestKey, value: AnyValue) -> Result<T> {
    value
        .downcast::<T>()
        .map(|v| T::clone(&v))
        .map_err(|_| WayfareError::TypeMismatch {
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mismatched_type_is_reported() {
        let optimizer = RequestOptimizer::new(OptimizerConfig::default());
        let _: u32 = optimizer
            .run("t", &1, || async { Ok(5u32) }, Duration::from_secs(60))
            .await
            .unwrap();

        let err = optimizer
            .run::<_, _, _, String>(
                "t",
                &1,
                || async { Ok("x".to_string()) },
                Duration::from_secs(60),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WayfareError::TypeMismatch { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_entries() {
        let optimizer = RequestOptimizer::new(
            OptimizerConfig::new().sweep_interval(Duration::from_secs(10)),
        );
        let _sweeper = optimizer.spawn_sweeper();

        let _: u32 = optimizer
            .run("t", &1, || async { Ok(1u32) }, Duration::from_secs(2))
            .await
            .unwrap();

        // Expired but not yet swept: still stored.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(optimizer.inner.cache.stored_entries().await, 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(optimizer.inner.cache.stored_entries().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sweep_interval_does_not_kill_the_sweeper() {
        let optimizer =
            RequestOptimizer::new(OptimizerConfig::new().sweep_interval(Duration::ZERO));
        let sweeper = optimizer.spawn_sweeper();

        let _: u32 = optimizer
            .run("t", &1, || async { Ok(1u32) }, Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!sweeper.is_finished());
        assert_eq!(optimizer.inner.cache.stored_entries().await, 0);

        drop(optimizer);
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn invalid_params_fail_before_fetch() {
        let optimizer = RequestOptimizer::new(OptimizerConfig::default());
        let mut params = std::collections::HashMap::new();
        params.insert(vec![1u8], 1);
        let result: Result<u32> = optimizer
            .run("t", &params, || async { Ok(1) }, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(WayfareError::Json(_))));
    }
}
