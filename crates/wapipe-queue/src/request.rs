// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Utc};
use wapipe_core::{MessagePayload, Priority, WapipeError};

/// Input to [`MessageQueue::enqueue`](crate::MessageQueue::enqueue).
///
/// Unset optional fields take the queue's configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueRequest {
    pub tenant_id: String,
    pub customer_id: Option<String>,
    pub to: String,
    pub payload: MessagePayload,
    pub priority: Priority,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_retries: Option<u32>,
    pub idempotency_key: Option<String>,
    pub reply_to: Option<String>,
}

impl EnqueueRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        to: impl Into<String>,
        payload: MessagePayload,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            customer_id: None,
            to: to.into(),
            payload,
            priority: Priority::default(),
            scheduled_at: None,
            expires_at: None,
            max_retries: None,
            idempotency_key: None,
            reply_to: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn reply_to(mut self, provider_message_id: impl Into<String>) -> Self {
        self.reply_to = Some(provider_message_id.into());
        self
    }
}

/// Reduces a phone number to the bare digits WhatsApp expects.
///
/// Accepts a leading `+` and common separators; rejects anything that is
/// not 7 to 15 digits afterwards.
pub fn normalize_recipient(raw: &str) -> Result<String, WapipeError> {
    let digits: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(WapipeError::Invalid(format!(
            "recipient {raw:?} is not a phone number"
        )));
    }
    Ok(digits)
}
