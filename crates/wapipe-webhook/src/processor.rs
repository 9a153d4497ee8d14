// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook verification and parsing, independent of the HTTP layer.

use std::sync::Arc;

use tracing::{debug, warn};
use wapipe_core::{
    InboundMessage, MessageStatusUpdate, ProviderAdapter, ProviderRegistry, WapipeError,
};

use crate::auth::constant_time_eq;
use crate::sink::InboundSink;

/// What a processed webhook turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Inbound(InboundMessage),
    Status(MessageStatusUpdate),
    /// Authentic, but nothing the pipeline consumes.
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Inbound(_) => "inbound",
            WebhookOutcome::Status(_) => "status",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

pub struct WebhookProcessor {
    registry: Arc<ProviderRegistry>,
    sink: Arc<dyn InboundSink>,
}

impl WebhookProcessor {
    pub fn new(registry: Arc<ProviderRegistry>, sink: Arc<dyn InboundSink>) -> Self {
        Self { registry, sink }
    }

    fn provider(&self, tenant_id: &str) -> Result<Arc<dyn ProviderAdapter>, WapipeError> {
        self.registry.require(tenant_id)
    }

    /// Header the tenant's provider signs payloads in, if any.
    pub fn signature_header(&self, tenant_id: &str) -> Option<&'static str> {
        self.registry
            .get(tenant_id)
            .and_then(|p| p.webhook_config().signature_header)
    }

    /// Verifies `body`, parses it, and hands the result to the sink.
    ///
    /// Unknown tenants are [`WapipeError::NotFound`], bad signatures
    /// [`WapipeError::Unauthorized`]. Payloads that parse to nothing are
    /// [`WebhookOutcome::Ignored`], not errors.
    pub async fn process(
        &self,
        tenant_id: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WapipeError> {
        let provider = self.provider(tenant_id)?;
        if !provider.verify_webhook_signature(body, signature) {
            warn!(tenant_id, has_signature = signature.is_some(), "webhook signature rejected");
            return Err(WapipeError::Unauthorized(format!(
                "invalid webhook signature for tenant {tenant_id}"
            )));
        }

        if let Some(message) = provider.parse_inbound_message(body) {
            self.sink.on_message(tenant_id, message.clone()).await?;
            return Ok(WebhookOutcome::Inbound(message));
        }
        if let Some(update) = provider.parse_status_update(body) {
            self.sink.on_status(tenant_id, update.clone()).await?;
            return Ok(WebhookOutcome::Status(update));
        }
        debug!(tenant_id, bytes = body.len(), "webhook carried nothing to process");
        Ok(WebhookOutcome::Ignored)
    }

    /// Answers the provider's subscription handshake: returns the challenge
    /// when `mode` is `subscribe` and the token matches the configured one.
    pub fn verify_subscription(
        &self,
        tenant_id: &str,
        mode: &str,
        token: &str,
        challenge: &str,
    ) -> Result<String, WapipeError> {
        let provider = self.provider(tenant_id)?;
        let expected = provider.webhook_config().verify_token.unwrap_or_default();
        if mode == "subscribe"
            && !expected.is_empty()
            && constant_time_eq(token.trim().as_bytes(), expected.as_bytes())
        {
            debug!(tenant_id, "webhook subscription verified");
            return Ok(challenge.to_string());
        }
        warn!(tenant_id, mode, "webhook subscription verification failed");
        Err(WapipeError::Unauthorized(
            "webhook verification token mismatch".into(),
        ))
    }
}

impl std::fmt::Debug for WebhookProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookProcessor")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
