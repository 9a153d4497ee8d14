// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message store contract used by the queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::WapipeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{MessageStatus, Priority, QueuedMessage};

/// Conjunctive filter over queued messages. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    pub id: Option<String>,
    pub tenant_id: Option<String>,
    /// Tenants whose messages are left out.
    pub excluded_tenants: Vec<String>,
    pub idempotency_key: Option<String>,
    /// Empty means any status.
    pub statuses: Vec<MessageStatus>,
    pub scheduled_at_or_before: Option<DateTime<Utc>>,
    pub expires_after: Option<DateTime<Utc>>,
    pub expires_at_or_before: Option<DateTime<Utc>>,
    pub processed_before: Option<DateTime<Utc>>,
    pub processed_at_or_after: Option<DateTime<Utc>>,
    /// Messages last attempted before this instant. Never-attempted
    /// messages do not match.
    pub last_attempt_before: Option<DateTime<Utc>>,
}

impl MessageFilter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn statuses(mut self, statuses: impl IntoIterator<Item = MessageStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn matches(&self, message: &QueuedMessage) -> bool {
        if self.id.as_ref().is_some_and(|id| *id != message.id) {
            return false;
        }
        if self
            .tenant_id
            .as_ref()
            .is_some_and(|t| *t != message.tenant_id)
        {
            return false;
        }
        if self.excluded_tenants.contains(&message.tenant_id) {
            return false;
        }
        if self.idempotency_key.is_some() && self.idempotency_key != message.idempotency_key {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&message.status) {
            return false;
        }
        if self
            .scheduled_at_or_before
            .is_some_and(|t| message.scheduled_at > t)
        {
            return false;
        }
        if self.expires_after.is_some_and(|t| message.expires_at <= t) {
            return false;
        }
        if self
            .expires_at_or_before
            .is_some_and(|t| message.expires_at > t)
        {
            return false;
        }
        if let Some(before) = self.processed_before {
            match message.processed_at {
                Some(at) if at < before => {}
                _ => return false,
            }
        }
        if let Some(after) = self.processed_at_or_after {
            match message.processed_at {
                Some(at) if at >= after => {}
                _ => return false,
            }
        }
        if let Some(before) = self.last_attempt_before {
            match message.last_attempt_at {
                Some(at) if at < before => {}
                _ => return false,
            }
        }
        true
    }
}

/// Partial update. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub status: Option<MessageStatus>,
    pub retry_count: Option<u32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl MessagePatch {
    pub fn status(status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(&self, message: &mut QueuedMessage) {
        if let Some(status) = self.status {
            message.status = status;
        }
        if let Some(count) = self.retry_count {
            message.retry_count = count;
        }
        if let Some(at) = self.scheduled_at {
            message.scheduled_at = at;
        }
        if let Some(at) = self.last_attempt_at {
            message.last_attempt_at = Some(at);
        }
        if let Some(err) = &self.last_error {
            message.last_error = Some(err.clone());
        }
        if let Some(id) = &self.provider_message_id {
            message.provider_message_id = Some(id.clone());
        }
        if let Some(at) = self.processed_at {
            message.processed_at = Some(at);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageOrder {
    /// Priority rank ascending, then `scheduled_at` ascending.
    #[default]
    Dispatch,
    CreatedAt,
}

impl MessageOrder {
    pub fn compare(self, a: &QueuedMessage, b: &QueuedMessage) -> std::cmp::Ordering {
        match self {
            MessageOrder::Dispatch => a
                .priority
                .cmp(&b.priority)
                .then(a.scheduled_at.cmp(&b.scheduled_at))
                .then(a.created_at.cmp(&b.created_at)),
            MessageOrder::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Status,
    Priority,
    TenantId,
}

impl GroupField {
    pub fn key_of(self, message: &QueuedMessage) -> String {
        match self {
            GroupField::Status => message.status.to_string(),
            GroupField::Priority => message.priority.to_string(),
            GroupField::TenantId => message.tenant_id.clone(),
        }
    }
}

/// Grouped count, e.g. `("queued", 12)`.
pub type GroupCount = (String, u64);

/// Persistence for queued messages.
#[async_trait]
pub trait MessageStore: PluginAdapter {
    async fn create(&self, message: &QueuedMessage) -> Result<(), WapipeError>;

    async fn find_many(
        &self,
        filter: &MessageFilter,
        order: MessageOrder,
        limit: Option<usize>,
    ) -> Result<Vec<QueuedMessage>, WapipeError>;

    /// Returns `false` when no message with `id` exists.
    async fn update(&self, id: &str, patch: &MessagePatch) -> Result<bool, WapipeError>;

    async fn update_many(
        &self,
        filter: &MessageFilter,
        patch: &MessagePatch,
    ) -> Result<u64, WapipeError>;

    async fn count(&self, filter: &MessageFilter) -> Result<u64, WapipeError>;

    async fn group_by(
        &self,
        field: GroupField,
        filter: &MessageFilter,
    ) -> Result<Vec<GroupCount>, WapipeError>;

    /// Deletes terminal messages processed before `before`.
    ///
    /// Durable stores keep their history; only in-process stores prune.
    async fn prune_terminal(&self, _before: DateTime<Utc>) -> Result<u64, WapipeError> {
        Ok(0)
    }
}
