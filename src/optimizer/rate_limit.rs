//! Sliding-window rate limiter with a global minimum spacing.
//!
//! Each category keeps the start instants of its requests from the
//! trailing window. A category is saturated while that count is at its
//! limit; callers then suspend and re-check every poll interval until the
//! window slides. Independently, consecutive admissions of *any* category
//! are kept at least `min_interval` apart.
//!
//! Check and record happen under one lock, so two callers can never both
//! take the last slot or both skip the spacing wait.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::config::{MIN_TICK, OptimizerConfig};
use crate::telemetry;

#[derive(Default)]
struct State {
    windows: HashMap<String, VecDeque<Instant>>,
    last_admitted: Option<Instant>,
}

/// Outcome of one admission attempt.
enum Admission {
    Admitted,
    Saturated,
    Spacing(Duration),
}

pub struct RateLimiter {
    state: Mutex<State>,
    window: Duration,
    default_limit: usize,
    category_limits: HashMap<String, usize>,
    min_interval: Duration,
    poll_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: &OptimizerConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            window: config.rate_window,
            default_limit: config.max_requests_per_window,
            category_limits: config.category_limits.clone(),
            min_interval: config.min_request_interval,
            poll_interval: config.poll_interval.max(MIN_TICK),
        }
    }

    /// Effective per-window limit for `category`. Never below 1, so a
    /// category can always make progress eventually.
    pub fn limit_for(&self, category: &str) -> usize {
        self.category_limits
            .get(category)
            .copied()
            .unwrap_or(self.default_limit)
            .max(1)
    }

    /// Suspend until `category` may start a request, then record it.
    ///
    /// Never fails: saturation is handled by waiting.
    pub async fn acquire(&self, category: &str) {
        let mut waited = false;
        loop {
            match self.try_admit(category) {
                Admission::Admitted => return,
                Admission::Saturated => {
                    if !waited {
                        waited = true;
                        metrics::counter!(telemetry::RATE_LIMIT_WAITS_TOTAL,
                            "category" => category.to_owned(),
                        )
                        .increment(1);
                        debug!(category, "rate window saturated, waiting for a slot");
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Admission::Spacing(remaining) => tokio::time::sleep(remaining).await,
            }
        }
    }

    fn try_admit(&self, category: &str) -> Admission {
        let limit = self.limit_for(category);
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let State {
            windows,
            last_admitted,
        } = &mut *state;

        let window = windows.entry(category.to_owned()).or_default();
        prune(window, now, self.window);
        if window.len() >= limit {
            return Admission::Saturated;
        }

        if let Some(last) = *last_admitted {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Admission::Spacing(self.min_interval - elapsed);
            }
        }

        window.push_back(now);
        *last_admitted = Some(now);
        Admission::Admitted
    }

    /// Requests started per category within the current window.
    pub fn window_counts(&self) -> HashMap<String, usize> {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .windows
            .iter_mut()
            .map(|(category, window)| {
                prune(window, now, self.window);
                (category.clone(), window.len())
            })
            .collect()
    }
}

/// Drop timestamps that have left the trailing window.
fn prune(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
    while let Some(&oldest) = window.front() {
        if now.saturating_duration_since(oldest) >= length {
            window.pop_front();
        } else {
            break;
        }
    }
}
