// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch metrics, recorded through the metrics facade.

use metrics::{describe_counter, describe_histogram};

/// Registers dispatch metric descriptions. Called once after the recorder
/// is installed.
pub fn register_metrics() {
    describe_counter!(
        "wapipe_dispatch_total",
        "Dispatch attempts by outcome (sent, retried, failed, deferred, expired)"
    );
    describe_counter!("wapipe_swept_total", "Messages expired or pruned by the sweeper");
    describe_histogram!(
        "wapipe_send_latency_seconds",
        "Provider send latency in seconds"
    );
}

pub(crate) fn record_outcome(tenant_id: &str, outcome: &'static str) {
    metrics::counter!(
        "wapipe_dispatch_total",
        "tenant" => tenant_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub(crate) fn record_latency(provider: &str, seconds: f64) {
    metrics::histogram!("wapipe_send_latency_seconds", "provider" => provider.to_string())
        .record(seconds);
}

pub(crate) fn record_swept(kind: &'static str, count: u64) {
    if count > 0 {
        metrics::counter!("wapipe_swept_total", "kind" => kind).increment(count);
    }
}
