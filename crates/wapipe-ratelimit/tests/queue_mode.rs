// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queueing behaviour of the global limiter, driven on paused tokio time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use wapipe_config::RateLimitConfig;
use wapipe_core::Clock;
use wapipe_ratelimit::{DenialReason, RateLimiter};

/// Wall clock that follows tokio's (paused) time.
struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    fn new() -> Self {
        Self {
            base: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.start.elapsed()).unwrap()
    }
}

fn queueing(mps: u32) -> RateLimiter {
    let config = RateLimitConfig {
        messages_per_second: mps,
        burst_size: mps,
        window_ms: 1000,
        queue_excess: true,
        tenant_limit_per_minute: 50,
    };
    RateLimiter::with_clock(&config, Arc::new(TokioClock::new()))
}

#[tokio::test(start_paused = true)]
async fn queued_callers_are_granted_in_order() {
    let limiter = queueing(2);
    assert!(limiter.acquire().await.allowed);
    assert!(limiter.acquire().await.allowed);

    let start = tokio::time::Instant::now();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            let permit = limiter.acquire().await;
            (permit, start.elapsed())
        }));
        tokio::task::yield_now().await;
    }

    let mut waits = Vec::new();
    for handle in handles {
        let (permit, waited) = handle.await.unwrap();
        assert!(permit.allowed);
        waits.push(waited);
    }
    // Two per second: the first pair lands in the next second, the second
    // pair in the one after.
    assert!(waits[1] >= Duration::from_millis(1000), "{waits:?}");
    assert!(waits[3] >= Duration::from_millis(1500), "{waits:?}");
    assert!(waits.windows(2).all(|w| w[0] <= w[1]), "{waits:?}");
}

#[tokio::test(start_paused = true)]
async fn reset_rejects_every_waiter() {
    let limiter = queueing(1);
    assert!(limiter.acquire().await.allowed);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(limiter.status().queued, 3);

    limiter.reset();
    for waiter in waiters {
        let permit = waiter.await.unwrap();
        assert!(!permit.allowed);
        assert_eq!(permit.reason, Some(DenialReason::Reset));
    }
    assert!(limiter.can_send_now());
}

#[tokio::test(start_paused = true)]
async fn abandoned_waiter_does_not_consume_a_token() {
    let limiter = queueing(1);
    assert!(limiter.acquire().await.allowed);

    let abandoned = {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let patient = {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    abandoned.abort();

    let permit = patient.await.unwrap();
    assert!(permit.allowed);
    assert_eq!(limiter.status().queued, 0);
}

#[tokio::test(start_paused = true)]
async fn non_queueing_denial_reports_wait() {
    let config = RateLimitConfig {
        messages_per_second: 1,
        burst_size: 1,
        window_ms: 1000,
        queue_excess: false,
        tenant_limit_per_minute: 50,
    };
    let limiter = RateLimiter::with_clock(&config, Arc::new(TokioClock::new()));
    assert!(limiter.acquire().await.allowed);
    let denied = limiter.acquire().await;
    assert!(!denied.allowed);
    assert!(denied.wait > Duration::ZERO);
    assert!(denied.wait <= Duration::from_millis(1010));
}
