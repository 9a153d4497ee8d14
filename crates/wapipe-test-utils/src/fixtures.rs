// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical message builders for tests.

use chrono::{DateTime, Duration, Utc};
use wapipe_core::{MessagePayload, MessageStatus, Priority, QueuedMessage};

/// A queued text message for `tenant_id`, due at `now` and valid for an hour.
pub fn queued_message(id: &str, tenant_id: &str, now: DateTime<Utc>) -> QueuedMessage {
    QueuedMessage {
        id: id.to_string(),
        tenant_id: tenant_id.to_string(),
        customer_id: None,
        to: "15550001111".to_string(),
        payload: MessagePayload::text(format!("hello from {id}")),
        priority: Priority::Normal,
        status: MessageStatus::Queued,
        retry_count: 0,
        max_retries: 3,
        created_at: now,
        scheduled_at: now,
        expires_at: now + Duration::hours(1),
        last_attempt_at: None,
        last_error: None,
        provider_message_id: None,
        processed_at: None,
        idempotency_key: None,
        reply_to: None,
    }
}
