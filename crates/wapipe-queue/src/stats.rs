// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue statistics and health classification.

use std::collections::BTreeMap;

use serde::Serialize;
use wapipe_config::QueueConfig;

/// Coarse queue health reported by `GET /v1/stats` and `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueHealth {
    Healthy,
    Degraded,
    Overloaded,
}

impl QueueHealth {
    /// Classifies a pending backlog and last-hour failure ratio against the
    /// configured thresholds. The worse of the two signals wins.
    pub fn classify(backlog: u64, failure_rate: f64, config: &QueueConfig) -> Self {
        if backlog >= config.overloaded_backlog || failure_rate >= config.overloaded_failure_rate {
            QueueHealth::Overloaded
        } else if backlog >= config.degraded_backlog
            || failure_rate >= config.degraded_failure_rate
        {
            QueueHealth::Degraded
        } else {
            QueueHealth::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatistics {
    /// `None` for the all-tenant view.
    pub tenant_id: Option<String>,
    pub total: u64,
    /// Message count per status name.
    pub by_status: BTreeMap<String, u64>,
    /// Pending (queued or rate-limited) message count per priority name.
    pub pending_by_priority: BTreeMap<String, u64>,
    pub backlog: u64,
    pub sent_last_minute: u64,
    pub sent_last_hour: u64,
    pub failed_last_hour: u64,
    /// `failed / (sent + failed)` over the last hour; zero with no traffic.
    pub failure_rate: f64,
    pub health: QueueHealth,
}

pub(crate) fn failure_rate(sent: u64, failed: u64) -> f64 {
    let attempted = sent + failed;
    if attempted == 0 {
        0.0
    } else {
        failed as f64 / attempted as f64
    }
}
