// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic queue maintenance.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wapipe_queue::MessageQueue;

use crate::metrics;

/// Runs [`MessageQueue::sweep`] every `interval` until `cancel` fires.
pub async fn run_sweeper(queue: Arc<MessageQueue>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        match queue.sweep().await {
            Ok(report) => {
                metrics::record_swept("expired", report.expired);
                metrics::record_swept("pruned", report.pruned);
                metrics::record_swept("recovered", report.recovered);
                if report.expired > 0 || report.pruned > 0 || report.recovered > 0 {
                    info!(
                        expired = report.expired,
                        pruned = report.pruned,
                        recovered = report.recovered,
                        tenant_windows = report.tenant_windows,
                        "queue swept"
                    );
                }
            }
            Err(e) => error!(error = %e, "queue sweep failed"),
        }
    }
    info!("sweeper stopped");
}
