// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Downstream consumer of parsed webhook events.

use async_trait::async_trait;
use tracing::info;
use wapipe_core::{InboundMessage, MessageStatusUpdate, WapipeError};

/// Receives what the webhook processor parsed, keyed by tenant.
///
/// Provider ids are always populated, so implementations can deduplicate on
/// redelivery.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn on_message(&self, tenant_id: &str, message: InboundMessage)
    -> Result<(), WapipeError>;

    async fn on_status(
        &self,
        tenant_id: &str,
        update: MessageStatusUpdate,
    ) -> Result<(), WapipeError>;
}

/// Sink that only logs. Used when no downstream consumer is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl InboundSink for LoggingSink {
    async fn on_message(
        &self,
        tenant_id: &str,
        message: InboundMessage,
    ) -> Result<(), WapipeError> {
        info!(
            tenant_id,
            provider_message_id = %message.provider_message_id,
            from = %message.from,
            "inbound message"
        );
        Ok(())
    }

    async fn on_status(
        &self,
        tenant_id: &str,
        update: MessageStatusUpdate,
    ) -> Result<(), WapipeError> {
        info!(
            tenant_id,
            provider_message_id = %update.provider_message_id,
            status = %update.status,
            "delivery status"
        );
        Ok(())
    }
}
