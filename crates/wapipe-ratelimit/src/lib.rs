// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound rate limiting for wapipe.
//!
//! [`RateLimiter`] is a global token bucket with a hard per-second ceiling
//! matching the provider's messaging cap. [`TenantRateLimiter`] wraps it with
//! a rolling one-minute window per tenant so no single tenant can drain the
//! shared capacity.

pub mod bucket;
pub mod tenant;

use std::time::Duration;

pub use bucket::{LimiterStatus, RateLimiter};
pub use tenant::{TenantCheck, TenantRateLimiter};

/// Why an acquire was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Global bucket or per-second ceiling exhausted.
    RateLimited,
    /// The tenant's one-minute window is full.
    TenantLimited,
    /// The limiter was reset while the caller was waiting. Retryable.
    Reset,
}

/// Result of an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    pub allowed: bool,
    /// Suggested delay before trying again. Zero when allowed.
    pub wait: Duration,
    pub reason: Option<DenialReason>,
}

impl Permit {
    pub fn granted() -> Self {
        Self {
            allowed: true,
            wait: Duration::ZERO,
            reason: None,
        }
    }

    pub fn denied(reason: DenialReason, wait: Duration) -> Self {
        Self {
            allowed: false,
            wait,
            reason: Some(reason),
        }
    }

    pub fn is_tenant_limited(&self) -> bool {
        self.reason == Some(DenialReason::TenantLimited)
    }
}
