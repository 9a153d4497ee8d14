// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatch loop: pull a batch, rate limit, send, record the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wapipe_config::DispatchConfig;
use wapipe_core::{
    MessageStatus, PluginAdapter, ProviderRegistry, QueuedMessage, SendFailure,
    SendOutcome, WapipeError,
};
use wapipe_queue::{MessageQueue, StatusDetails};

use crate::metrics;

/// What happened to one message in a dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Sent,
    /// Send failed and a retry was scheduled.
    Retried,
    Failed,
    /// Rate limited; put back with a later schedule.
    Deferred,
    Expired,
    /// Changed underneath the dispatcher (cancelled, finished).
    Skipped,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Sent => "sent",
            Disposition::Retried => "retried",
            Disposition::Failed => "failed",
            Disposition::Deferred => "deferred",
            Disposition::Expired => "expired",
            Disposition::Skipped => "skipped",
        }
    }
}

/// Tally of one [`Dispatcher::dispatch_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    pub deferred: usize,
    pub expired: usize,
    pub skipped: usize,
    /// Messages whose bookkeeping hit a store error.
    pub errors: usize,
}

impl DispatchReport {
    pub fn processed(&self) -> usize {
        self.sent
            + self.retried
            + self.failed
            + self.deferred
            + self.expired
            + self.skipped
            + self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.processed() == 0
    }

    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Sent => self.sent += 1,
            Disposition::Retried => self.retried += 1,
            Disposition::Failed => self.failed += 1,
            Disposition::Deferred => self.deferred += 1,
            Disposition::Expired => self.expired += 1,
            Disposition::Skipped => self.skipped += 1,
        }
    }
}

/// Moves due messages from the queue to each tenant's provider.
pub struct Dispatcher {
    queue: Arc<MessageQueue>,
    registry: Arc<ProviderRegistry>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<MessageQueue>,
        registry: Arc<ProviderRegistry>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            config,
        }
    }

    fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.config.send_timeout_secs)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    /// Polls until `cancel` fires. A full batch is followed immediately by
    /// the next poll.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "dispatcher started"
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let full = match self.dispatch_once().await {
                Ok(report) => {
                    if !report.is_empty() {
                        debug!(?report, "dispatch pass");
                    }
                    report.processed() >= self.config.batch_size
                }
                Err(e) => {
                    error!(error = %e, "dispatch pass failed");
                    false
                }
            };
            if full {
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval()) => {}
            }
        }
        info!("dispatcher stopped");
    }

    /// Dispatches one batch. Messages of the batch are sent concurrently.
    ///
    /// Only a failure to read the batch is an error; per-message store
    /// failures are logged and counted in [`DispatchReport::errors`].
    pub async fn dispatch_once(&self) -> Result<DispatchReport, WapipeError> {
        let batch = self.queue.get_next_batch(self.config.batch_size).await?;
        let results = join_all(batch.into_iter().map(|m| self.dispatch_message(m))).await;

        let mut report = DispatchReport::default();
        for result in results {
            match result {
                Ok(disposition) => report.record(disposition),
                Err(e) => {
                    error!(error = %e, "message bookkeeping failed");
                    report.errors += 1;
                }
            }
        }
        Ok(report)
    }

    /// Runs one message, as read from [`MessageQueue::get_next_batch`],
    /// through limiter, provider and status bookkeeping.
    pub async fn dispatch_message(&self, message: QueuedMessage) -> Result<Disposition, WapipeError> {
        let disposition = self.try_dispatch(&message).await?;
        metrics::record_outcome(&message.tenant_id, disposition.as_str());
        Ok(disposition)
    }

    async fn try_dispatch(&self, message: &QueuedMessage) -> Result<Disposition, WapipeError> {
        let id = message.id.as_str();
        if message.is_expired_at(self.queue.now()) {
            self.queue
                .update_status(
                    id,
                    MessageStatus::Expired,
                    StatusDetails::error("expired before dispatch"),
                )
                .await?;
            return Ok(Disposition::Expired);
        }

        let Some(provider) = self.registry.get(&message.tenant_id) else {
            warn!(message_id = id, tenant_id = %message.tenant_id, "no provider for tenant");
            self.queue
                .update_status(
                    id,
                    MessageStatus::Failed,
                    StatusDetails::error(format!(
                        "no provider configured for tenant {}",
                        message.tenant_id
                    )),
                )
                .await?;
            return Ok(Disposition::Failed);
        };

        let permit = self.queue.limiter().acquire(&message.tenant_id).await;
        if !permit.allowed {
            // A reset denial carries no wait; come back on the next poll.
            let wait = permit.wait.max(self.poll_interval());
            debug!(message_id = id, reason = ?permit.reason, ?wait, "send deferred");
            return Ok(if self.queue.defer(id, wait).await? {
                Disposition::Deferred
            } else {
                Disposition::Skipped
            });
        }

        let claimed = self
            .queue
            .update_status(id, MessageStatus::Sending, StatusDetails::default())
            .await;
        if !matches!(claimed, Ok(true)) {
            // Cancelled or finished since the batch was read.
            self.queue.limiter().refund(&message.tenant_id);
            return claimed.map(|_| Disposition::Skipped);
        }

        let outbound = message.to_outbound();
        let started = Instant::now();
        let timeout = self.send_timeout();
        let outcome = tokio::time::timeout(timeout, provider.send_message(&outbound))
            .await
            .unwrap_or_else(|_| SendOutcome::Failed(SendFailure::timeout(timeout)));
        metrics::record_latency(provider.name(), started.elapsed().as_secs_f64());

        match outcome {
            SendOutcome::Sent {
                provider_message_id,
            } => {
                debug!(message_id = id, %provider_message_id, "message sent");
                let details = StatusDetails::sent(provider_message_id);
                self.queue
                    .update_status(id, MessageStatus::Sent, details)
                    .await?;
                Ok(Disposition::Sent)
            }
            SendOutcome::Failed(failure) if failure.retryable => {
                let reason = failure.to_string();
                if self.queue.schedule_retry(id, &reason).await? {
                    return Ok(Disposition::Retried);
                }
                warn!(message_id = id, error = %reason, "retries exhausted, message failed");
                self.queue
                    .update_status(id, MessageStatus::Failed, StatusDetails::error(reason))
                    .await?;
                Ok(Disposition::Failed)
            }
            SendOutcome::Failed(failure) => {
                warn!(message_id = id, error = %failure, "send rejected, message failed");
                let details = StatusDetails::error(failure.to_string());
                self.queue
                    .update_status(id, MessageStatus::Failed, details)
                    .await?;
                Ok(Disposition::Failed)
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
