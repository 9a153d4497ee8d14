// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations over a [`MessageStore`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wapipe_config::QueueConfig;
use wapipe_core::{
    Clock, GroupField, MessageFilter, MessageOrder, MessagePatch, MessageStatus, MessageStore,
    PluginAdapter, QueuedMessage, SystemClock, WapipeError,
};
use wapipe_ratelimit::TenantRateLimiter;

use crate::request::{EnqueueRequest, normalize_recipient};
use crate::stats::{self, QueueHealth, QueueStatistics};

/// Statuses still waiting for a dispatch attempt.
const PENDING: [MessageStatus; 2] = [MessageStatus::Queued, MessageStatus::RateLimited];

/// Candidates fetched per requested batch slot, so tenant filtering can
/// usually fill the batch in one page.
const OVERFETCH: usize = 3;

/// Extra fields recorded alongside a status change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusDetails {
    pub error: Option<String>,
    pub provider_message_id: Option<String>,
}

impl StatusDetails {
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            provider_message_id: None,
        }
    }

    pub fn sent(provider_message_id: impl Into<String>) -> Self {
        Self {
            error: None,
            provider_message_id: Some(provider_message_id.into()),
        }
    }
}

/// What one [`MessageQueue::sweep`] pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: u64,
    pub pruned: u64,
    /// Messages stuck in `sending` that were handed back to the queue.
    pub recovered: u64,
    pub tenant_windows: usize,
}

pub struct MessageQueue {
    store: Arc<dyn MessageStore>,
    limiter: Arc<TenantRateLimiter>,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
}

impl MessageQueue {
    pub fn new(
        store: Arc<dyn MessageStore>,
        limiter: Arc<TenantRateLimiter>,
        config: QueueConfig,
    ) -> Self {
        Self::with_clock(store, limiter, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn MessageStore>,
        limiter: Arc<TenantRateLimiter>,
        config: QueueConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            limiter,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<TenantRateLimiter> {
        &self.limiter
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Validates and persists a new message in status `queued`.
    ///
    /// A request whose idempotency key the tenant already used returns the
    /// existing message instead of queueing a second send.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<QueuedMessage, WapipeError> {
        if request.tenant_id.trim().is_empty() {
            return Err(WapipeError::Invalid("tenant id is empty".into()));
        }
        if let Some(key) = &request.idempotency_key
            && let Some(existing) = self.find_by_key(&request.tenant_id, key).await?
        {
            debug!(message_id = %existing.id, idempotency_key = %key, "duplicate enqueue");
            return Ok(existing);
        }
        let to = normalize_recipient(&request.to)?;
        let now = self.clock.now();
        let expires_at = request
            .expires_at
            .unwrap_or_else(|| after_secs(now, self.config.default_expiry_secs));
        if expires_at <= now {
            return Err(WapipeError::Invalid(format!(
                "expires_at {expires_at} is not in the future"
            )));
        }

        let message = QueuedMessage {
            id: Uuid::new_v4().to_string(),
            tenant_id: request.tenant_id,
            customer_id: request.customer_id,
            to,
            payload: request.payload,
            priority: request.priority,
            status: MessageStatus::Queued,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(self.config.max_retries),
            created_at: now,
            scheduled_at: request.scheduled_at.unwrap_or(now),
            expires_at,
            last_attempt_at: None,
            last_error: None,
            provider_message_id: None,
            processed_at: None,
            idempotency_key: request.idempotency_key,
            reply_to: request.reply_to,
        };
        match self.store.create(&message).await {
            Ok(()) => {}
            // Lost a race with a concurrent enqueue of the same key.
            Err(e @ WapipeError::Duplicate { .. }) => {
                if let Some(key) = &message.idempotency_key
                    && let Some(existing) = self.find_by_key(&message.tenant_id, key).await?
                {
                    return Ok(existing);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        }
        info!(
            message_id = %message.id,
            tenant_id = %message.tenant_id,
            priority = %message.priority,
            kind = message.payload.message_type(),
            "message enqueued"
        );
        Ok(message)
    }

    async fn find_by_key(
        &self,
        tenant_id: &str,
        key: &str,
    ) -> Result<Option<QueuedMessage>, WapipeError> {
        let filter = MessageFilter::default().tenant(tenant_id).idempotency_key(key);
        let mut found = self
            .store
            .find_many(&filter, MessageOrder::CreatedAt, Some(1))
            .await?;
        Ok(found.pop())
    }

    pub async fn get(&self, id: &str) -> Result<Option<QueuedMessage>, WapipeError> {
        let mut found = self
            .store
            .find_many(&MessageFilter::by_id(id), MessageOrder::CreatedAt, Some(1))
            .await?;
        Ok(found.pop())
    }

    /// Up to `limit` due, unexpired messages in dispatch order.
    ///
    /// Messages of a tenant whose window is full are skipped, so a
    /// lower-priority message of another tenant can be returned ahead of
    /// them. Each tenant contributes at most its remaining window capacity.
    /// Exhausted tenants are excluded from the next page, so their backlog
    /// never hides other tenants' messages.
    pub async fn get_next_batch(&self, limit: usize) -> Result<Vec<QueuedMessage>, WapipeError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let mut due = MessageFilter {
            statuses: PENDING.to_vec(),
            scheduled_at_or_before: Some(now),
            expires_after: Some(now),
            ..Default::default()
        };

        let mut remaining: HashMap<String, u32> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut batch = Vec::with_capacity(limit);
        loop {
            // Messages already taken come back on every page, so ask for
            // that many more.
            let page_size = limit.saturating_mul(OVERFETCH).saturating_add(batch.len());
            let page = self
                .store
                .find_many(&due, MessageOrder::Dispatch, Some(page_size))
                .await?;
            let exhausted_page = page.len() < page_size;
            let mut newly_exhausted = false;

            for message in page {
                if taken.contains(&message.id) || message.is_expired_at(now) {
                    continue;
                }
                let left = remaining
                    .entry(message.tenant_id.clone())
                    .or_insert_with(|| {
                        self.limiter.check_tenant_limit(&message.tenant_id).remaining
                    });
                if *left == 0 {
                    if !due.excluded_tenants.contains(&message.tenant_id) {
                        due.excluded_tenants.push(message.tenant_id.clone());
                        newly_exhausted = true;
                    }
                    continue;
                }
                *left -= 1;
                taken.insert(message.id.clone());
                batch.push(message);
                if batch.len() == limit {
                    break;
                }
            }

            // Each further page excludes at least one more tenant.
            if batch.len() == limit || exhausted_page || !newly_exhausted {
                break;
            }
        }
        debug!(
            requested = limit,
            returned = batch.len(),
            skipped_tenants = due.excluded_tenants.len(),
            "next batch"
        );
        Ok(batch)
    }

    /// Records a status change. Terminal statuses stamp `processed_at`,
    /// `sending` stamps `last_attempt_at`.
    ///
    /// A message that already reached a terminal status is left alone and
    /// `false` is returned, as it is for unknown ids.
    pub async fn update_status(
        &self,
        id: &str,
        status: MessageStatus,
        details: StatusDetails,
    ) -> Result<bool, WapipeError> {
        let now = self.clock.now();
        let patch = MessagePatch {
            status: Some(status),
            last_error: details.error,
            provider_message_id: details.provider_message_id,
            last_attempt_at: (status == MessageStatus::Sending).then_some(now),
            processed_at: status.is_terminal().then_some(now),
            ..Default::default()
        };
        let open = MessageFilter::by_id(id).statuses(
            MessageStatus::ALL
                .into_iter()
                .filter(|s| !s.is_terminal()),
        );
        let changed = self.store.update_many(&open, &patch).await? > 0;
        if !changed {
            warn!(message_id = id, %status, "status update ignored for unknown or finished message");
        }
        Ok(changed)
    }

    /// Puts a message back to `rate_limited`, not due again before `wait`.
    pub async fn defer(&self, id: &str, wait: std::time::Duration) -> Result<bool, WapipeError> {
        let now = self.clock.now();
        let wait = Duration::from_std(wait).unwrap_or(Duration::zero());
        let patch = MessagePatch {
            status: Some(MessageStatus::RateLimited),
            scheduled_at: Some(now.checked_add_signed(wait).unwrap_or(now)),
            ..Default::default()
        };
        let filter = MessageFilter::by_id(id).statuses(
            PENDING
                .into_iter()
                .chain(std::iter::once(MessageStatus::Sending)),
        );
        Ok(self.store.update_many(&filter, &patch).await? > 0)
    }

    /// Re-queues a failed message along the backoff table.
    ///
    /// Returns `false` without touching the message when its retry budget is
    /// spent or it already finished; the caller then marks it `failed`.
    pub async fn schedule_retry(&self, id: &str, error: &str) -> Result<bool, WapipeError> {
        let message = self.get(id).await?.ok_or_else(|| WapipeError::NotFound {
            entity: "message",
            id: id.to_string(),
        })?;
        if message.status.is_terminal() || message.retry_count >= message.max_retries {
            debug!(
                message_id = id,
                retry_count = message.retry_count,
                max_retries = message.max_retries,
                "retry budget exhausted"
            );
            return Ok(false);
        }

        let retry_count = message.retry_count + 1;
        let delay_ms = self.backoff_ms(retry_count);
        let now = self.clock.now();
        let patch = MessagePatch {
            status: Some(MessageStatus::Queued),
            retry_count: Some(retry_count),
            scheduled_at: Some(after_ms(now, delay_ms)),
            last_error: Some(error.to_string()),
            ..Default::default()
        };
        self.store.update(id, &patch).await?;
        info!(message_id = id, retry_count, delay_ms, error, "retry scheduled");
        Ok(true)
    }

    /// Delay before retry number `attempt`, counting from 1. The last entry
    /// of the table repeats.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let table = &self.config.retry_backoff_ms;
        let index = (attempt.max(1) as usize - 1).min(table.len().saturating_sub(1));
        table.get(index).copied().unwrap_or(0)
    }

    /// Expires a message that has not been picked up yet.
    ///
    /// Returns `false` when the message is in flight, finished, or unknown.
    pub async fn cancel(&self, id: &str) -> Result<bool, WapipeError> {
        let now = self.clock.now();
        let patch = MessagePatch {
            status: Some(MessageStatus::Expired),
            last_error: Some("cancelled".into()),
            processed_at: Some(now),
            ..Default::default()
        };
        let filter = MessageFilter::by_id(id).statuses(PENDING);
        let cancelled = self.store.update_many(&filter, &patch).await? > 0;
        if cancelled {
            info!(message_id = id, "message cancelled");
        }
        Ok(cancelled)
    }

    /// Counts, recent throughput and health, optionally for one tenant.
    pub async fn statistics(&self, tenant_id: Option<&str>) -> Result<QueueStatistics, WapipeError> {
        let now = self.clock.now();
        let base = MessageFilter {
            tenant_id: tenant_id.map(str::to_string),
            ..Default::default()
        };

        let by_status: BTreeMap<String, u64> = self
            .store
            .group_by(GroupField::Status, &base)
            .await?
            .into_iter()
            .collect();
        let pending = base.clone().statuses(PENDING);
        let pending_by_priority: BTreeMap<String, u64> = self
            .store
            .group_by(GroupField::Priority, &pending)
            .await?
            .into_iter()
            .collect();

        let finished_since = |status: MessageStatus, since: DateTime<Utc>| MessageFilter {
            processed_at_or_after: Some(since),
            ..base.clone().statuses([status])
        };
        let minute_ago = now - Duration::minutes(1);
        let hour_ago = now - Duration::hours(1);
        let sent_last_minute = self
            .store
            .count(&finished_since(MessageStatus::Sent, minute_ago))
            .await?;
        let sent_last_hour = self
            .store
            .count(&finished_since(MessageStatus::Sent, hour_ago))
            .await?;
        let failed_last_hour = self
            .store
            .count(&finished_since(MessageStatus::Failed, hour_ago))
            .await?;

        let backlog = pending_by_priority.values().sum();
        let failure_rate = stats::failure_rate(sent_last_hour, failed_last_hour);
        Ok(QueueStatistics {
            tenant_id: tenant_id.map(str::to_string),
            total: by_status.values().sum(),
            by_status,
            pending_by_priority,
            backlog,
            sent_last_minute,
            sent_last_hour,
            failed_last_hour,
            failure_rate,
            health: QueueHealth::classify(backlog, failure_rate, &self.config),
        })
    }

    /// Expires stale pending messages, re-queues sends that stayed in
    /// `sending` past `stale_sending_secs`, prunes old terminal entries from
    /// the in-process store, and drops idle tenant windows.
    pub async fn sweep(&self) -> Result<SweepReport, WapipeError> {
        let now = self.clock.now();
        let stale = MessageFilter {
            statuses: PENDING.to_vec(),
            expires_at_or_before: Some(now),
            ..Default::default()
        };
        let patch = MessagePatch {
            status: Some(MessageStatus::Expired),
            last_error: Some("expired before delivery".into()),
            processed_at: Some(now),
            ..Default::default()
        };
        let mut expired = self.store.update_many(&stale, &patch).await?;

        // A send that never reported back, e.g. after a crash. Expired ones
        // are closed; the rest go back to the queue.
        let abandoned = MessageFilter {
            statuses: vec![MessageStatus::Sending],
            expires_at_or_before: Some(now),
            ..Default::default()
        };
        expired += self
            .store
            .update_many(
                &abandoned,
                &MessagePatch {
                    last_error: Some("expired while sending".into()),
                    ..patch
                },
            )
            .await?;
        let stuck = MessageFilter {
            statuses: vec![MessageStatus::Sending],
            last_attempt_before: Some(before_secs(now, self.config.stale_sending_secs)),
            ..Default::default()
        };
        let requeue = MessagePatch {
            status: Some(MessageStatus::Queued),
            scheduled_at: Some(now),
            last_error: Some("send attempt abandoned".into()),
            ..Default::default()
        };
        let recovered = self.store.update_many(&stuck, &requeue).await?;
        if recovered > 0 {
            warn!(recovered, "re-queued messages stuck in sending");
        }

        let cutoff = before_secs(now, self.config.retention_secs);
        let pruned = self.store.prune_terminal(cutoff).await?;
        let tenant_windows = self.limiter.cleanup();

        if expired > 0 || pruned > 0 || recovered > 0 {
            info!(expired, pruned, recovered, tenant_windows, "queue sweep");
        }
        Ok(SweepReport {
            expired,
            pruned,
            recovered,
            tenant_windows,
        })
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn after_ms(now: DateTime<Utc>, ms: u64) -> DateTime<Utc> {
    Duration::try_milliseconds(clamp_i64(ms))
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn after_secs(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    after_ms(now, secs.saturating_mul(1000))
}

fn before_secs(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    Duration::try_seconds(clamp_i64(secs))
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
