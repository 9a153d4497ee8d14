// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global token bucket with a hard per-second ceiling.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};
use wapipe_config::RateLimitConfig;
use wapipe_core::{Clock, SystemClock};

use crate::{DenialReason, Permit};

/// Lower bound on the pump's sleep between grant attempts.
const MIN_PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// Slack added past a second boundary so the next attempt lands inside the
/// new second.
const SECOND_BOUNDARY_BUFFER_MS: i64 = 10;

#[derive(Debug, Clone, Copy)]
struct Settings {
    messages_per_second: u32,
    burst_size: u32,
    window_ms: u64,
    queue_excess: bool,
}

/// Bucket state. `0 <= tokens <= burst_size` at all times.
#[derive(Debug, Clone)]
struct BucketState {
    tokens: f64,
    last_refill_ms: i64,
    sent_this_second: u32,
    current_second: i64,
}

impl BucketState {
    fn full(settings: &Settings, now_ms: i64) -> Self {
        Self {
            tokens: f64::from(settings.burst_size),
            last_refill_ms: now_ms,
            sent_this_second: 0,
            current_second: now_ms.div_euclid(1000),
        }
    }

    fn refill(&mut self, settings: &Settings, now_ms: i64) {
        let elapsed = now_ms - self.last_refill_ms;
        if elapsed > 0 {
            let added =
                elapsed as f64 * f64::from(settings.messages_per_second) / settings.window_ms as f64;
            self.tokens = (self.tokens + added).min(f64::from(settings.burst_size));
            self.last_refill_ms = now_ms;
        }
        let second = now_ms.div_euclid(1000);
        if second != self.current_second {
            self.current_second = second;
            self.sent_this_second = 0;
        }
    }

    /// Time until a token could be taken, or `None` if one is available now.
    fn wait_for_token(&self, settings: &Settings, now_ms: i64) -> Option<Duration> {
        if self.sent_this_second >= settings.messages_per_second {
            let next_second_ms = (self.current_second + 1) * 1000;
            let ms = (next_second_ms - now_ms + SECOND_BOUNDARY_BUFFER_MS).max(0);
            return Some(Duration::from_millis(ms as u64));
        }
        if self.tokens >= 1.0 {
            return None;
        }
        let missing = 1.0 - self.tokens;
        let ms = (missing * settings.window_ms as f64 / f64::from(settings.messages_per_second))
            .ceil()
            .max(1.0);
        Some(Duration::from_millis(ms as u64))
    }

    fn try_take(&mut self, settings: &Settings, now_ms: i64) -> Result<(), Duration> {
        self.refill(settings, now_ms);
        match self.wait_for_token(settings, now_ms) {
            Some(wait) => Err(wait),
            None => {
                self.tokens -= 1.0;
                self.sent_this_second += 1;
                Ok(())
            }
        }
    }

    /// Gives back a grant nobody received.
    fn refund(&mut self, settings: &Settings) {
        self.tokens = (self.tokens + 1.0).min(f64::from(settings.burst_size));
        self.sent_this_second = self.sent_this_second.saturating_sub(1);
    }
}

struct Shared {
    bucket: BucketState,
    waiters: VecDeque<oneshot::Sender<Permit>>,
    pump_active: bool,
}

struct Inner {
    settings: Settings,
    clock: Arc<dyn Clock>,
    shared: Mutex<Shared>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Snapshot of limiter state.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterStatus {
    pub tokens: f64,
    pub queued: usize,
    pub sent_this_second: u32,
    pub estimated_wait: Duration,
}

/// Global outbound limiter shared by every dispatcher task.
///
/// Cloning is cheap; all clones share one bucket. When `queue_excess` is set,
/// callers that cannot be served immediately wait in FIFO order and a
/// background pump task grants them as capacity frees up.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let messages_per_second = config.messages_per_second.max(1);
        let mut burst_size = config.burst_size.max(1);
        if burst_size > messages_per_second {
            warn!(
                burst_size,
                messages_per_second,
                "burst_size exceeds messages_per_second, clamping to the per-second cap"
            );
            burst_size = messages_per_second;
        }
        let settings = Settings {
            messages_per_second,
            burst_size,
            window_ms: config.window_ms.max(1),
            queue_excess: config.queue_excess,
        };
        let now = clock.now_ms();
        Self {
            inner: Arc::new(Inner {
                settings,
                clock,
                shared: Mutex::new(Shared {
                    bucket: BucketState::full(&settings, now),
                    waiters: VecDeque::new(),
                    pump_active: false,
                }),
            }),
        }
    }

    /// Effective bucket capacity after clamping.
    pub fn burst_size(&self) -> u32 {
        self.inner.settings.burst_size
    }

    pub fn messages_per_second(&self) -> u32 {
        self.inner.settings.messages_per_second
    }

    /// Takes one send slot.
    ///
    /// Without `queue_excess` this never suspends: a denial carries the time
    /// until a slot frees up. With `queue_excess` the caller waits its turn;
    /// the only denial is [`DenialReason::Reset`].
    pub async fn acquire(&self) -> Permit {
        let rx = {
            let mut shared = self.inner.lock();
            let now = self.inner.clock.now_ms();
            let settings = &self.inner.settings;

            // Queued callers go first.
            if shared.waiters.is_empty() {
                match shared.bucket.try_take(settings, now) {
                    Ok(()) => return Permit::granted(),
                    Err(wait) if !settings.queue_excess => {
                        return Permit::denied(DenialReason::RateLimited, wait);
                    }
                    Err(_) => {}
                }
            }

            let (tx, rx) = oneshot::channel();
            shared.waiters.push_back(tx);
            debug!(queued = shared.waiters.len(), "rate limit reached, caller queued");
            if !shared.pump_active {
                shared.pump_active = true;
                tokio::spawn(pump(Arc::clone(&self.inner)));
            }
            rx
        };

        rx.await
            .unwrap_or_else(|_| Permit::denied(DenialReason::Reset, Duration::ZERO))
    }

    /// Whether a send could be granted right now, without taking it.
    pub fn can_send_now(&self) -> bool {
        let mut shared = self.inner.lock();
        let now = self.inner.clock.now_ms();
        shared.bucket.refill(&self.inner.settings, now);
        shared.waiters.is_empty()
            && shared
                .bucket
                .wait_for_token(&self.inner.settings, now)
                .is_none()
    }

    pub fn status(&self) -> LimiterStatus {
        let mut shared = self.inner.lock();
        let settings = &self.inner.settings;
        let now = self.inner.clock.now_ms();
        shared.bucket.refill(settings, now);

        let first = shared
            .bucket
            .wait_for_token(settings, now)
            .unwrap_or(Duration::ZERO);
        let per_token = Duration::from_millis(settings.window_ms)
            / settings.messages_per_second;
        let queued = shared.waiters.len();
        LimiterStatus {
            tokens: shared.bucket.tokens,
            queued,
            sent_this_second: shared.bucket.sent_this_second,
            estimated_wait: first + per_token * queued as u32,
        }
    }

    /// Returns a granted slot whose send never happened.
    pub fn refund(&self) {
        let mut shared = self.inner.lock();
        let now = self.inner.clock.now_ms();
        shared.bucket.refill(&self.inner.settings, now);
        shared.bucket.refund(&self.inner.settings);
    }

    /// Restores a full bucket and rejects every queued caller with
    /// [`DenialReason::Reset`].
    pub fn reset(&self) {
        let mut shared = self.inner.lock();
        let now = self.inner.clock.now_ms();
        shared.bucket = BucketState::full(&self.inner.settings, now);
        let rejected = shared.waiters.len();
        for waiter in shared.waiters.drain(..) {
            let _ = waiter.send(Permit::denied(DenialReason::Reset, Duration::ZERO));
        }
        if rejected > 0 {
            warn!(rejected, "rate limiter reset with queued callers");
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

/// Grants queued callers in order until the queue drains.
async fn pump(inner: Arc<Inner>) {
    loop {
        let delay = {
            let mut shared = inner.lock();
            let now = inner.clock.now_ms();
            loop {
                while shared.waiters.front().is_some_and(|w| w.is_closed()) {
                    shared.waiters.pop_front();
                }
                if shared.waiters.is_empty() {
                    shared.pump_active = false;
                    return;
                }
                match shared.bucket.try_take(&inner.settings, now) {
                    Ok(()) => {
                        if let Some(waiter) = shared.waiters.pop_front()
                            && waiter.send(Permit::granted()).is_err()
                        {
                            shared.bucket.refund(&inner.settings);
                        }
                    }
                    Err(wait) => break wait.max(MIN_PUMP_INTERVAL),
                }
            }
        };
        tokio::time::sleep(delay).await;
    }
}
