//! Telemetry metric name constants.
//!
//! Centralised metric names for wayfare operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `wayfare_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `category`: request category (e.g. "places", "autocomplete")
//! - `status`: outcome: "ok" or "error"

/// Total cache hits in [`RequestOptimizer::run`](crate::RequestOptimizer::run).
///
/// Labels: `category`.
pub const CACHE_HITS_TOTAL: &str = "wayfare_cache_hits_total";

/// Total cache misses.
///
/// Labels: `category`.
pub const CACHE_MISSES_TOTAL: &str = "wayfare_cache_misses_total";

/// Expired entries removed by the periodic sweep.
pub const CACHE_SWEPT_TOTAL: &str = "wayfare_cache_swept_total";

/// Callers that attached to an identical in-flight request instead of
/// starting their own fetch.
///
/// Labels: `category`.
pub const DEDUP_ATTACHED_TOTAL: &str = "wayfare_dedup_attached_total";

/// Fetches that had to wait for a rate-limit slot in their category.
///
/// Labels: `category`.
pub const RATE_LIMIT_WAITS_TOTAL: &str = "wayfare_rate_limit_waits_total";

/// Total fetches actually dispatched.
///
/// Labels: `category`, `status` ("ok" | "error").
pub const FETCHES_TOTAL: &str = "wayfare_fetches_total";

/// Fetch duration in seconds, measured from dispatch to settlement.
///
/// Labels: `category`.
pub const FETCH_DURATION_SECONDS: &str = "wayfare_fetch_duration_seconds";

/// Autocomplete queries answered empty because the input was too short.
pub const SHORT_CIRCUIT_TOTAL: &str = "wayfare_short_circuit_total";
