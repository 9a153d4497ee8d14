// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use metrics::describe_counter;

/// Registers HTTP-side metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "wapipe_webhooks_total",
        "Webhook deliveries by tenant and outcome"
    );
    describe_counter!("wapipe_enqueued_total", "Messages accepted through the API");
}

pub(crate) fn record_webhook(tenant_id: &str, outcome: &'static str) {
    metrics::counter!(
        "wapipe_webhooks_total",
        "tenant" => tenant_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub(crate) fn record_enqueued(tenant_id: &str) {
    metrics::counter!("wapipe_enqueued_total", "tenant" => tenant_id.to_string()).increment(1);
}
