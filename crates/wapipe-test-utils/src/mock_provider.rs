// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock provider adapter for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with scripted send outcomes,
//! so dispatcher and queue tests run without any HTTP.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use wapipe_core::types::{
    AccountStatus, AvailableNumber, Capability, InboundMessage, MessageStatusUpdate, NumberQuery,
    OutboundMessage, ProvisionRequest, ProvisionedNumber, SendFailure, SendOutcome,
    TemplateMessage, UsagePeriod, UsageStats, VerificationMethod, WebhookConfig,
};
use wapipe_core::{
    AdapterType, HealthStatus, MessagePayload, PluginAdapter, ProviderAdapter, ProviderKind,
    WapipeError,
};

/// One scripted send result.
#[derive(Debug, Clone)]
pub enum MockSend {
    /// Succeeds with the given provider message id.
    Sent(String),
    /// Fails with the given code.
    Fail { code: String, retryable: bool },
    /// Never completes; exercises caller timeouts.
    Hang,
}

/// A provider that replays scripted outcomes and records what it was asked
/// to send.
///
/// Outcomes are popped from a FIFO queue. When the queue is empty every send
/// succeeds with a generated id.
pub struct MockProvider {
    script: Arc<Mutex<VecDeque<MockSend>>>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    counter: AtomicU64,
    signatures_valid: bool,
    inbound: Option<InboundMessage>,
    status: Option<MessageStatusUpdate>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            counter: AtomicU64::new(0),
            signatures_valid: true,
            inbound: None,
            status: None,
        }
    }

    pub fn with_script(script: Vec<MockSend>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(script))),
            ..Self::new()
        }
    }

    /// Rejects every webhook signature.
    pub fn rejecting_signatures(mut self) -> Self {
        self.signatures_valid = false;
        self
    }

    /// Returns `message` from every inbound parse.
    pub fn with_inbound(mut self, message: InboundMessage) -> Self {
        self.inbound = Some(message);
        self
    }

    /// Returns `update` from every status parse.
    pub fn with_status(mut self, update: MessageStatusUpdate) -> Self {
        self.status = Some(update);
        self
    }

    pub async fn push(&self, outcome: MockSend) {
        self.script.lock().await.push_back(outcome);
    }

    /// Every message passed to a send, in order.
    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn send_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, WapipeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WapipeError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::CloudApi
    }

    fn supports_provisioning(&self) -> bool {
        false
    }

    fn supports_templates(&self) -> bool {
        true
    }

    fn supports_interactive(&self) -> bool {
        true
    }

    fn supports_media(&self) -> bool {
        true
    }

    async fn available_numbers(
        &self,
        _query: &NumberQuery,
    ) -> Result<Capability<Vec<AvailableNumber>>, WapipeError> {
        Ok(Capability::unsupported(self.kind(), "available_numbers"))
    }

    async fn provision_number(
        &self,
        _request: &ProvisionRequest,
    ) -> Result<Capability<ProvisionedNumber>, WapipeError> {
        Ok(Capability::unsupported(self.kind(), "provision_number"))
    }

    async fn release_number(&self, _number_id: &str) -> Result<Capability<()>, WapipeError> {
        Ok(Capability::unsupported(self.kind(), "release_number"))
    }

    async fn send_verification_code(
        &self,
        _number_id: &str,
        _method: VerificationMethod,
    ) -> Result<Capability<()>, WapipeError> {
        Ok(Capability::unsupported(self.kind(), "send_verification_code"))
    }

    async fn verify_code(
        &self,
        _number_id: &str,
        _code: &str,
    ) -> Result<Capability<bool>, WapipeError> {
        Ok(Capability::unsupported(self.kind(), "verify_code"))
    }

    async fn send_message(&self, message: &OutboundMessage) -> SendOutcome {
        self.sent.lock().await.push(message.clone());
        let next = self.script.lock().await.pop_front();
        match next {
            Some(MockSend::Sent(id)) => SendOutcome::Sent {
                provider_message_id: id,
            },
            Some(MockSend::Fail { code, retryable }) => SendOutcome::Failed(SendFailure {
                message: format!("mock failure {code}"),
                code,
                retryable,
            }),
            Some(MockSend::Hang) => std::future::pending().await,
            None => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                SendOutcome::Sent {
                    provider_message_id: format!("wamid.mock-{n}"),
                }
            }
        }
    }

    async fn send_template(&self, to: &str, template: &TemplateMessage) -> SendOutcome {
        let message = OutboundMessage {
            to: to.to_string(),
            content: MessagePayload::Template(template.clone()),
            idempotency_key: None,
            reply_to: None,
        };
        self.send_message(&message).await
    }

    fn webhook_config(&self) -> WebhookConfig {
        WebhookConfig {
            provider: self.kind(),
            signature_header: Some("x-hub-signature-256"),
            verify_token: Some("mock-verify".to_string()),
            subscribed_fields: vec!["messages"],
            secret_configured: true,
        }
    }

    fn verify_webhook_signature(&self, _payload: &[u8], _signature: Option<&str>) -> bool {
        self.signatures_valid
    }

    fn parse_inbound_message(&self, _payload: &[u8]) -> Option<InboundMessage> {
        self.inbound.clone()
    }

    fn parse_status_update(&self, _payload: &[u8]) -> Option<MessageStatusUpdate> {
        self.status.clone()
    }

    async fn account_status(&self) -> Result<Capability<AccountStatus>, WapipeError> {
        Ok(Capability::Supported(AccountStatus {
            connected: true,
            ..Default::default()
        }))
    }

    async fn usage_stats(
        &self,
        period: UsagePeriod,
    ) -> Result<Capability<UsageStats>, WapipeError> {
        let sent = self.sent.lock().await.len() as u64;
        Ok(Capability::Supported(UsageStats {
            period,
            sent,
            delivered: sent,
            read: None,
            failed: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn outbound() -> OutboundMessage {
        OutboundMessage {
            to: "15550001111".into(),
            content: MessagePayload::text("hi"),
            idempotency_key: Some("k-1".into()),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn replays_script_then_succeeds() {
        let provider = MockProvider::with_script(vec![MockSend::Fail {
            code: "131000".into(),
            retryable: true,
        }]);
        match provider.send_message(&outbound()).await {
            SendOutcome::Failed(failure) => assert!(failure.retryable),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(
            provider.send_message(&outbound()).await,
            SendOutcome::Sent {
                provider_message_id: "wamid.mock-1".into()
            }
        );
        assert_eq!(provider.send_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_completes() {
        let provider = MockProvider::with_script(vec![MockSend::Hang]);
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            provider.send_message(&outbound()),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn usage_counts_sends() {
        let provider = MockProvider::new();
        provider.send_message(&outbound()).await;
        let now = Utc::now();
        let usage = provider
            .usage_stats(UsagePeriod { start: now, end: now })
            .await
            .unwrap()
            .supported()
            .unwrap();
        assert_eq!(usage.sent, 1);
    }
}
