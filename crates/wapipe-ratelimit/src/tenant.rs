// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant fairness layer over the global limiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;
use wapipe_config::RateLimitConfig;
use wapipe_core::{Clock, SystemClock};

use crate::bucket::RateLimiter;
use crate::{DenialReason, Permit};

/// Length of the rolling tenant window.
pub const TENANT_WINDOW_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct TenantWindow {
    count: u32,
    window_start_ms: i64,
}

impl TenantWindow {
    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms - self.window_start_ms >= TENANT_WINDOW_MS
    }

    fn remaining_ms(&self, now_ms: i64) -> u64 {
        (self.window_start_ms + TENANT_WINDOW_MS - now_ms).clamp(0, TENANT_WINDOW_MS) as u64
    }
}

/// Answer to [`TenantRateLimiter::check_tenant_limit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantCheck {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the window resets. Never more than one minute.
    pub wait: Duration,
}

/// Global limiter plus a rolling one-minute cap per tenant.
pub struct TenantRateLimiter {
    global: RateLimiter,
    default_limit: u32,
    overrides: HashMap<String, u32>,
    windows: Mutex<HashMap<String, TenantWindow>>,
    clock: Arc<dyn Clock>,
}

impl TenantRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self::with_clock(RateLimiter::with_clock(config, clock.clone()), config, clock)
    }

    pub fn with_clock(global: RateLimiter, config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            global,
            default_limit: config.tenant_limit_per_minute.max(1),
            overrides: HashMap::new(),
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Sets a tenant-specific per-minute cap.
    pub fn with_override(mut self, tenant_id: impl Into<String>, limit_per_minute: u32) -> Self {
        self.overrides
            .insert(tenant_id.into(), limit_per_minute.max(1));
        self
    }

    pub fn global(&self) -> &RateLimiter {
        &self.global
    }

    pub fn limit_for(&self, tenant_id: &str) -> u32 {
        self.overrides
            .get(tenant_id)
            .copied()
            .unwrap_or(self.default_limit)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TenantWindow>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current window for `tenant_id`, created or restarted as needed.
    fn window<'a>(
        windows: &'a mut HashMap<String, TenantWindow>,
        tenant_id: &str,
        now_ms: i64,
    ) -> &'a mut TenantWindow {
        let window = windows
            .entry(tenant_id.to_string())
            .or_insert(TenantWindow {
                count: 0,
                window_start_ms: now_ms,
            });
        if window.is_expired(now_ms) {
            *window = TenantWindow {
                count: 0,
                window_start_ms: now_ms,
            };
        }
        window
    }

    pub fn check_tenant_limit(&self, tenant_id: &str) -> TenantCheck {
        let limit = self.limit_for(tenant_id);
        let now = self.clock.now_ms();
        let mut windows = self.lock();
        let window = Self::window(&mut windows, tenant_id, now);
        let allowed = window.count < limit;
        TenantCheck {
            allowed,
            remaining: limit.saturating_sub(window.count),
            wait: if allowed {
                Duration::ZERO
            } else {
                Duration::from_millis(window.remaining_ms(now))
            },
        }
    }

    /// Checks the tenant window, then the global limiter.
    ///
    /// The tenant slot is reserved before the global acquire (which may
    /// suspend) and released if the global limiter denies or the caller
    /// abandons the wait.
    pub async fn acquire(&self, tenant_id: &str) -> Permit {
        let limit = self.limit_for(tenant_id);
        let now = self.clock.now_ms();
        let reservation = {
            let mut windows = self.lock();
            let window = Self::window(&mut windows, tenant_id, now);
            if window.count >= limit {
                let wait = Duration::from_millis(window.remaining_ms(now));
                debug!(tenant_id, limit, ?wait, "tenant window full");
                return Permit::denied(DenialReason::TenantLimited, wait);
            }
            window.count += 1;
            Reservation {
                limiter: self,
                tenant_id,
                window_start_ms: window.window_start_ms,
                committed: false,
            }
        };

        let permit = self.global.acquire().await;
        if permit.allowed {
            reservation.commit();
        }
        permit
    }

    /// Gives back a granted permit that was not used for a send: the slot
    /// in the tenant's current window and the global token.
    pub fn refund(&self, tenant_id: &str) {
        let now = self.clock.now_ms();
        {
            let mut windows = self.lock();
            if let Some(window) = windows.get_mut(tenant_id)
                && !window.is_expired(now)
            {
                window.count = window.count.saturating_sub(1);
            }
        }
        self.global.refund();
        debug!(tenant_id, "permit refunded");
    }

    /// Drops expired tenant windows. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_ms();
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| !w.is_expired(now));
        before - windows.len()
    }

    pub fn tracked_tenants(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, tenant_id: &str, window_start_ms: i64) {
        let mut windows = self.lock();
        if let Some(window) = windows.get_mut(tenant_id)
            && window.window_start_ms == window_start_ms
        {
            window.count = window.count.saturating_sub(1);
        }
    }
}

impl std::fmt::Debug for TenantRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRateLimiter")
            .field("global", &self.global)
            .field("default_limit", &self.default_limit)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

/// A tenant slot taken ahead of the global acquire. Released on drop
/// unless committed.
struct Reservation<'a> {
    limiter: &'a TenantRateLimiter,
    tenant_id: &'a str,
    window_start_ms: i64,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.limiter.release(self.tenant_id, self.window_start_ms);
        }
    }
}
