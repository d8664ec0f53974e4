//! Optimizer tuning knobs.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::{Result, WayfareError};

/// Floor applied to timer periods at runtime. `tokio::time::interval`
/// panics on a zero period, and a zero poll would spin.
pub(crate) const MIN_TICK: Duration = Duration::from_millis(1);

/// Configuration for [`RequestOptimizer`](super::RequestOptimizer).
///
/// ```rust
/// # use wayfare::OptimizerConfig;
/// # use std::time::Duration;
/// let config = OptimizerConfig::new()
///     .max_requests_per_window(30)
///     .category_limit("autocomplete", 100)
///     .min_request_interval(Duration::from_millis(50));
/// ```
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Requests allowed per category within `rate_window`. Default: 50.
    pub max_requests_per_window: usize,
    /// Per-category overrides of `max_requests_per_window`.
    pub category_limits: HashMap<String, usize>,
    /// Length of the sliding rate window. Default: 60s.
    pub rate_window: Duration,
    /// How often a saturated caller re-checks its window. Default: 200ms.
    pub poll_interval: Duration,
    /// Minimum gap between any two dispatched requests. Default: 100ms.
    pub min_request_interval: Duration,
    /// Age after which an in-flight request is considered orphaned and a
    /// new caller starts its own fetch. Default: 5s.
    ///
    /// Shorter than a typical provider timeout, so a slow but live fetch
    /// can end up running alongside a second one for the same key.
    pub in_flight_stale_after: Duration,
    /// Interval of the background expiry sweep. Default: 5 minutes.
    pub sweep_interval: Duration,
    /// Maximum number of cached results. Default: 10,000.
    pub max_cache_entries: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 50,
            category_limits: HashMap::new(),
            rate_window: Duration::from_secs(60),
            poll_interval: Duration::from_millis(200),
            min_request_interval: Duration::from_millis(100),
            in_flight_stale_after: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(5 * 60),
            max_cache_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl OptimizerConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_requests_per_window(mut self, n: usize) -> Self {
        self.max_requests_per_window = n;
        self
    }

    /// Override the per-window limit for one category.
    pub fn category_limit(mut self, category: impl Into<String>, n: usize) -> Self {
        self.category_limits.insert(category.into(), n);
        self
    }

    pub fn rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn in_flight_stale_after(mut self, age: Duration) -> Self {
        self.in_flight_stale_after = age;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn max_cache_entries(mut self, n: u64) -> Self {
        self.max_cache_entries = n;
        self
    }

    /// Reject settings that cannot drive a timer.
    ///
    /// The optimizer itself clamps periods to a small floor, so calling this
    /// is optional for programmatic configs; file-based configs go through it.
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("rate_window", self.rate_window),
            ("poll_interval", self.poll_interval),
            ("sweep_interval", self.sweep_interval),
        ];
        for (name, period) in periods {
            if period.is_zero() {
                return Err(WayfareError::Configuration(format!(
                    "{name} must be non-zero"
                )));
            }
        }
        Ok(())
    }
}
