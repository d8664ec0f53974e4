//! Tests for [`RequestOptimizer`]: caching, coalescing, rate limiting and
//! spacing of remote lookups.
//!
//! All timing tests run on a paused clock; sleeps auto-advance it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use wayfare::{OptimizerConfig, RequestOptimizer, WayfareError};

const TTL: Duration = Duration::from_secs(600);

fn optimizer() -> RequestOptimizer {
    RequestOptimizer::new(OptimizerConfig::default())
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test(start_paused = true)]
async fn second_call_within_ttl_is_served_from_cache() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        let value: String = optimizer
            .run(
                "geocoding",
                &json!({"lat": 1.0, "lng": 2.0}),
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("Jalan Ampang".to_string())
                },
                TTL,
            )
            .await
            .unwrap();
        assert_eq!(value, "Jalan Ampang");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn param_field_order_shares_cache_entry() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));

    for params in [json!({"a": 1, "b": 2}), json!({"b": 2, "a": 1})] {
        let calls = Arc::clone(&calls);
        let _: u32 = optimizer
            .run(
                "places",
                &params,
                move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst)) },
                TTL,
            )
            .await
            .unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn same_params_in_different_categories_do_not_collide() {
    let optimizer = optimizer();

    let a: String = optimizer
        .run("places", &1, || async { Ok("places".to_string()) }, TTL)
        .await
        .unwrap();
    let b: String = optimizer
        .run("geocoding", &1, || async { Ok("geocoding".to_string()) }, TTL)
        .await
        .unwrap();

    assert_eq!(a, "places");
    assert_eq!(b, "geocoding");
    assert_eq!(optimizer.cache_stats().total_items, 2);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_is_fetched_again() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));
    let ttl = Duration::from_secs(10);

    let run = |optimizer: &RequestOptimizer| {
        let calls = Arc::clone(&calls);
        let optimizer = optimizer.clone();
        async move {
            optimizer
                .run(
                    "places",
                    &"kl",
                    move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) },
                    ttl,
                )
                .await
        }
    };

    assert_eq!(run(&optimizer).await.unwrap(), 1u32);
    tokio::time::advance(Duration::from_secs(9)).await;
    assert_eq!(run(&optimizer).await.unwrap(), 1u32);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(run(&optimizer).await.unwrap(), 2u32);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_is_not_cached() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));

    let first = {
        let calls = Arc::clone(&calls);
        optimizer
            .run::<_, _, _, u32>(
                "places",
                &"kl",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(WayfareError::Http("connection reset".into()))
                },
                TTL,
            )
            .await
    };
    assert_eq!(first, Err(WayfareError::Http("connection reset".into())));

    let second = {
        let calls = Arc::clone(&calls);
        optimizer
            .run(
                "places",
                &"kl",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7u32)
                },
                TTL,
            )
            .await
    };
    assert_eq!(second, Ok(7));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn zero_ttl_result_is_not_cached() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        let calls = Arc::clone(&calls);
        let _: u32 = optimizer
            .run(
                "places",
                &"kl",
                move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst)) },
                Duration::ZERO,
            )
            .await
            .unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(optimizer.cache_stats().total_items, 0);
}

#[tokio::test(start_paused = true)]
async fn clear_cache_forces_refetch() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));

    let run = || {
        let calls = Arc::clone(&calls);
        let optimizer = optimizer.clone();
        async move {
            optimizer
                .run(
                    "places",
                    &"kl",
                    move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst)) },
                    TTL,
                )
                .await
        }
    };

    let _: u32 = run().await.unwrap();
    assert_eq!(optimizer.cache_stats().total_items, 1);

    optimizer.clear_cache();
    assert_eq!(optimizer.cache_stats().total_items, 0);

    let _: u32 = run().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Coalescing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_identical_calls_fetch_once() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));
    let params = json!({"lat": 3.15, "lng": 101.71, "type": "restaurant", "radius": 1000});

    let call = || {
        let calls = Arc::clone(&calls);
        optimizer.run(
            "places",
            &params,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(Arc::new(vec!["Petronas Towers".to_string()]))
            },
            TTL,
        )
    };

    let (a, b, c) = tokio::join!(call(), call(), call());
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&b, &c));

    let stats = optimizer.cache_stats();
    assert_eq!(stats.total_items, 1);
    assert_eq!(stats.request_counts["places"], 1);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn attached_callers_share_the_rejection() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));

    let call = || {
        let calls = Arc::clone(&calls);
        optimizer.run::<_, _, _, u32>(
            "places",
            &"kl",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(500)).await;
                Err(WayfareError::RateLimited { retry_after: None })
            },
            TTL,
        )
    };

    let (a, b) = tokio::join!(call(), call());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a, Err(WayfareError::RateLimited { retry_after: None }));
    assert_eq!(a, b);
    assert_eq!(optimizer.cache_stats().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn in_flight_entry_is_visible_while_pending() {
    let optimizer = optimizer();

    let pending = {
        let optimizer = optimizer.clone();
        tokio::spawn(async move {
            optimizer
                .run(
                    "places",
                    &"kl",
                    || async {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        Ok(1u32)
                    },
                    TTL,
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(optimizer.cache_stats().in_flight, 1);

    assert_eq!(pending.await.unwrap(), Ok(1));
    assert_eq!(optimizer.cache_stats().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn orphaned_request_is_replaced_after_stale_bound() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));

    // First fetch hangs far past the stale bound.
    let hung = {
        let optimizer = optimizer.clone();
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            optimizer
                .run(
                    "places",
                    &"kl",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok("old".to_string())
                    },
                    TTL,
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(6)).await;

    let fresh: String = {
        let calls = Arc::clone(&calls);
        optimizer
            .run(
                "places",
                &"kl",
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("new".to_string())
                },
                TTL,
            )
            .await
            .unwrap()
    };

    assert_eq!(fresh, "new");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    hung.abort();
}

#[tokio::test(start_paused = true)]
async fn fetch_completes_after_caller_goes_away() {
    let optimizer = optimizer();
    let calls = Arc::new(AtomicU32::new(0));

    let caller = {
        let optimizer = optimizer.clone();
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            optimizer
                .run(
                    "places",
                    &"kl",
                    move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(42u32)
                    },
                    TTL,
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    caller.abort();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let cached: u32 = optimizer
        .run("places", &"kl", || async { Ok(0u32) }, TTL)
        .await
        .unwrap();
    assert_eq!(cached, 42);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(optimizer.cache_stats().in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn panicking_fetch_reports_task_failure() {
    let optimizer = optimizer();

    let result: wayfare::Result<u32> = optimizer
        .run(
            "places",
            &"kl",
            || async {
                if true {
                    panic!("provider exploded");
                }
                Ok(1u32)
            },
            TTL,
        )
        .await;

    assert!(matches!(result, Err(WayfareError::TaskFailed(_))));
    assert_eq!(optimizer.cache_stats().in_flight, 0);
}

// ============================================================================
// Rate limiting and spacing
// ============================================================================

/// Fire `n` distinct-key requests concurrently and return each fetch's
/// start instant, in start order.
async fn fire_distinct(optimizer: &RequestOptimizer, category: &str, n: u32) -> Vec<Instant> {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();

    for i in 0..n {
        let optimizer = optimizer.clone();
        let starts = Arc::clone(&starts);
        let category = category.to_string();
        handles.push(tokio::spawn(async move {
            optimizer
                .run(
                    &category,
                    &i,
                    move || async move {
                        starts.lock().unwrap().push(Instant::now());
                        Ok(i)
                    },
                    TTL,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut starts = starts.lock().unwrap().clone();
    starts.sort();
    starts
}

#[tokio::test(start_paused = true)]
async fn excess_requests_wait_for_window_to_slide() {
    let optimizer = RequestOptimizer::new(OptimizerConfig::new().max_requests_per_window(5));
    let begin = Instant::now();

    let starts = fire_distinct(&optimizer, "places", 7).await;

    assert_eq!(starts.len(), 7);
    let in_first_window = starts
        .iter()
        .filter(|s| s.duration_since(begin) < Duration::from_secs(60))
        .count();
    assert_eq!(in_first_window, 5);
    assert!(starts[5] >= starts[0] + Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn category_limits_are_independent() {
    let optimizer = RequestOptimizer::new(OptimizerConfig::new().max_requests_per_window(2));
    let begin = Instant::now();

    fire_distinct(&optimizer, "places", 2).await;
    fire_distinct(&optimizer, "geocoding", 2).await;

    assert!(begin.elapsed() < Duration::from_secs(1));
    let stats = optimizer.cache_stats();
    assert_eq!(stats.request_counts["places"], 2);
    assert_eq!(stats.request_counts["geocoding"], 2);
}

#[tokio::test(start_paused = true)]
async fn categories_containing_separator_keep_their_own_window() {
    let optimizer = RequestOptimizer::new(OptimizerConfig::new().max_requests_per_window(1));
    let begin = Instant::now();

    fire_distinct(&optimizer, "api:v1", 1).await;
    fire_distinct(&optimizer, "api:v2", 1).await;

    assert!(begin.elapsed() < Duration::from_secs(1));
    let stats = optimizer.cache_stats();
    assert_eq!(stats.request_counts["api:v1"], 1);
    assert_eq!(stats.request_counts["api:v2"], 1);
    assert!(!stats.request_counts.contains_key("api"));
}

#[tokio::test(start_paused = true)]
async fn dispatches_are_spaced_by_min_interval() {
    let optimizer = optimizer();

    let mut starts = fire_distinct(&optimizer, "places", 3).await;
    starts.extend(fire_distinct(&optimizer, "autocomplete", 3).await);
    starts.sort();

    for pair in starts.windows(2) {
        assert!(
            pair[1].duration_since(pair[0]) >= Duration::from_millis(100),
            "gap {:?} below minimum spacing",
            pair[1].duration_since(pair[0])
        );
    }
}

#[tokio::test(start_paused = true)]
async fn cache_hits_consume_no_rate_slots() {
    let optimizer = RequestOptimizer::new(OptimizerConfig::new().max_requests_per_window(1));
    let begin = Instant::now();

    for _ in 0..5 {
        let _: u32 = optimizer
            .run("places", &"kl", || async { Ok(1u32) }, TTL)
            .await
            .unwrap();
    }

    assert!(begin.elapsed() < Duration::from_secs(1));
    assert_eq!(optimizer.cache_stats().request_counts["places"], 1);
}

// ============================================================================
// Sweeper
// ============================================================================

#[tokio::test(start_paused = true)]
async fn zero_sweep_interval_keeps_sweeper_alive() {
    let optimizer = RequestOptimizer::new(OptimizerConfig::new().sweep_interval(Duration::ZERO));
    let sweeper = optimizer.spawn_sweeper();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!sweeper.is_finished());

    drop(optimizer);
    tokio_test::assert_ok!(sweeper.await);
}

#[tokio::test(start_paused = true)]
async fn sweeper_exits_when_optimizer_is_dropped() {
    let optimizer = RequestOptimizer::new(
        OptimizerConfig::new().sweep_interval(Duration::from_secs(1)),
    );
    let sweeper = optimizer.spawn_sweeper();

    let _: u32 = optimizer
        .run("places", &"kl", || async { Ok(1u32) }, Duration::from_millis(500))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!sweeper.is_finished());

    drop(optimizer);
    tokio_test::assert_ok!(
        tokio::time::timeout(Duration::from_secs(5), sweeper).await
    );
}
