// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! 360dialog provider adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::{debug, warn};
use wapipe_cloud::{classify, webhook, wire};
use wapipe_config::Dialog360Settings;
use wapipe_core::types::{
    AccountStatus, AvailableNumber, NumberQuery, ProvisionRequest, ProvisionedNumber,
    TemplateMessage, UsagePeriod, UsageStats, VerificationMethod, WebhookConfig,
};
use wapipe_core::{
    AdapterType, Capability, HealthStatus, InboundMessage, MessagePayload, MessageStatusUpdate,
    OutboundMessage, PluginAdapter, ProviderAdapter, ProviderKind, SendFailure, SendOutcome,
    WapipeError, verify_hmac_sha256,
};

use crate::hub::PartnerHub;

/// Channel API key header.
pub const API_KEY_HEADER: &str = "D360-API-KEY";

/// Header carrying the HMAC of the payload when a webhook secret is set up.
pub const SIGNATURE_HEADER: &str = "x-360dialog-signature";

/// 360dialog channel adapter.
#[derive(Clone)]
pub struct Dialog360Provider {
    client: reqwest::Client,
    settings: Dialog360Settings,
    hub: Option<PartnerHub>,
}

impl Dialog360Provider {
    pub fn new(settings: Dialog360Settings) -> Result<Self, WapipeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(&settings.api_key)
                .map_err(|e| WapipeError::Config(format!("invalid 360dialog API key header: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WapipeError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        let hub = match (&settings.partner_id, &settings.partner_token) {
            (Some(partner_id), Some(token)) => {
                Some(PartnerHub::new(&settings.hub_url, partner_id, token)?)
            }
            _ => None,
        };

        Ok(Self {
            client,
            settings,
            hub,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.settings.messaging_url.trim_end_matches('/'))
    }

    /// The partner hub and this adapter's channel id, when both are known.
    fn channel(&self) -> Option<(&PartnerHub, &str)> {
        Some((self.hub.as_ref()?, self.settings.channel_id.as_deref()?))
    }
}

impl std::fmt::Debug for Dialog360Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialog360Provider")
            .field("settings", &self.settings)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PluginAdapter for Dialog360Provider {
    fn name(&self) -> &str {
        "dialog360"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, WapipeError> {
        if self.settings.api_key.is_empty() {
            return Ok(HealthStatus::Unhealthy("API key not configured".into()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WapipeError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for Dialog360Provider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Dialog360
    }

    fn supports_provisioning(&self) -> bool {
        self.hub.is_some()
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
        query: &NumberQuery,
    ) -> Result<Capability<Vec<AvailableNumber>>, WapipeError> {
        match &self.hub {
            Some(hub) => Ok(Capability::Supported(hub.available_numbers(query).await?)),
            None => Ok(Capability::unsupported(self.kind(), "available_numbers")),
        }
    }

    async fn provision_number(
        &self,
        request: &ProvisionRequest,
    ) -> Result<Capability<ProvisionedNumber>, WapipeError> {
        match &self.hub {
            Some(hub) => Ok(Capability::Supported(hub.create_channel(request).await?)),
            None => Ok(Capability::unsupported(self.kind(), "provision_number")),
        }
    }

    async fn release_number(&self, number_id: &str) -> Result<Capability<()>, WapipeError> {
        match &self.hub {
            Some(hub) => Ok(Capability::Supported(hub.delete_channel(number_id).await?)),
            None => Ok(Capability::unsupported(self.kind(), "release_number")),
        }
    }

    async fn send_verification_code(
        &self,
        number_id: &str,
        method: VerificationMethod,
    ) -> Result<Capability<()>, WapipeError> {
        match &self.hub {
            Some(hub) => Ok(Capability::Supported(
                hub.request_code(number_id, method).await?,
            )),
            None => Ok(Capability::unsupported(self.kind(), "send_verification_code")),
        }
    }

    async fn verify_code(
        &self,
        number_id: &str,
        code: &str,
    ) -> Result<Capability<bool>, WapipeError> {
        match &self.hub {
            Some(hub) => Ok(Capability::Supported(hub.verify_code(number_id, code).await?)),
            None => Ok(Capability::unsupported(self.kind(), "verify_code")),
        }
    }

    async fn send_message(&self, message: &OutboundMessage) -> SendOutcome {
        if let Err(reason) = wire::validate(message) {
            return SendOutcome::Failed(SendFailure::invalid(reason));
        }
        let body = wire::message_body(message);
        let response = match self.client.post(self.messages_url()).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                let failure = classify::transport_failure(&e);
                warn!(code = %failure.code, retryable = failure.retryable, "360dialog send failed: {e}");
                return SendOutcome::Failed(failure);
            }
        };
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let outcome = classify::send_outcome(status, &text);
        debug!(status, kind = message.message_type(), sent = outcome.is_sent(), "360dialog send");
        outcome
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
            signature_header: Some(SIGNATURE_HEADER),
            verify_token: None,
            subscribed_fields: vec![webhook::MESSAGES_FIELD],
            secret_configured: self.settings.webhook_secret.is_some(),
        }
    }

    /// Channels without a webhook secret are unsigned; their payloads are
    /// accepted with a warning.
    fn verify_webhook_signature(&self, payload: &[u8], signature: Option<&str>) -> bool {
        let Some(secret) = self.settings.webhook_secret.as_deref() else {
            warn!(
                channel_id = ?self.settings.channel_id,
                "360dialog webhook secret not configured, accepting unsigned webhook"
            );
            return true;
        };
        match signature {
            Some(signature) => verify_hmac_sha256(payload, signature, secret.as_bytes()),
            None => false,
        }
    }

    fn parse_inbound_message(&self, payload: &[u8]) -> Option<InboundMessage> {
        webhook::parse_inbound_message(payload)
    }

    fn parse_status_update(&self, payload: &[u8]) -> Option<MessageStatusUpdate> {
        webhook::parse_status_update(payload)
    }

    async fn account_status(&self) -> Result<Capability<AccountStatus>, WapipeError> {
        match self.channel() {
            Some((hub, channel_id)) => Ok(Capability::Supported(
                hub.channel_status(channel_id).await?,
            )),
            None => Ok(Capability::unsupported(self.kind(), "account_status")),
        }
    }

    async fn usage_stats(
        &self,
        period: UsagePeriod,
    ) -> Result<Capability<UsageStats>, WapipeError> {
        match self.channel() {
            Some((hub, channel_id)) => {
                Ok(Capability::Supported(hub.usage(channel_id, period).await?))
            }
            None => Ok(Capability::unsupported(self.kind(), "usage_stats")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;
    use wapipe_core::sign_hmac_sha256;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(messaging_url: &str) -> Dialog360Settings {
        Dialog360Settings {
            api_key: "d360-key".into(),
            channel_id: None,
            partner_id: None,
            partner_token: None,
            webhook_secret: None,
            messaging_url: messaging_url.to_string(),
            hub_url: "http://unused".into(),
        }
    }

    fn outbound() -> OutboundMessage {
        OutboundMessage {
            to: "4915112345678".into(),
            content: MessagePayload::text("Hallo"),
            idempotency_key: None,
            reply_to: Some("wamid.IN".into()),
        }
    }

    #[tokio::test]
    async fn send_uses_api_key_header_and_cloud_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("D360-API-KEY", "d360-key"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "4915112345678",
                "context": { "message_id": "wamid.IN" },
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "messaging_product": "whatsapp",
                "contacts": [{ "input": "4915112345678", "wa_id": "4915112345678" }],
                "messages": [{ "id": "wamid.D360" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = Dialog360Provider::new(settings(&server.uri())).unwrap();
        assert_eq!(
            provider.send_message(&outbound()).await,
            SendOutcome::Sent {
                provider_message_id: "wamid.D360".into()
            }
        );
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let provider = Dialog360Provider::new(settings(&server.uri())).unwrap();
        match provider.send_message(&outbound()).await {
            SendOutcome::Failed(failure) => {
                assert_eq!(failure.code, "http_503");
                assert!(failure.retryable);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn without_partner_credentials_provisioning_is_unsupported() {
        let provider = Dialog360Provider::new(settings("http://unused")).unwrap();
        assert!(!provider.supports_provisioning());
        let numbers = provider
            .available_numbers(&NumberQuery {
                country_code: "49".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!numbers.is_supported());
        assert!(!provider.account_status().await.unwrap().is_supported());
    }

    #[test]
    #[traced_test]
    fn missing_secret_accepts_with_a_warning() {
        let provider = Dialog360Provider::new(settings("http://unused")).unwrap();
        assert!(provider.verify_webhook_signature(b"{}", None));
        assert!(!provider.webhook_config().secret_configured);
        assert!(logs_contain("webhook secret not configured"));
    }

    #[test]
    fn configured_secret_is_enforced() {
        let provider = Dialog360Provider::new(Dialog360Settings {
            webhook_secret: Some("hook-secret".into()),
            ..settings("http://unused")
        })
        .unwrap();
        let body = br#"{"object":"whatsapp_business_account","entry":[]}"#;
        let signature = sign_hmac_sha256(body, b"hook-secret");

        assert!(provider.verify_webhook_signature(body, Some(&signature)));
        assert!(!provider.verify_webhook_signature(body, None));
        let mut tampered = body.to_vec();
        tampered[3] ^= 0x01;
        assert!(!provider.verify_webhook_signature(&tampered, Some(&signature)));
    }
}
