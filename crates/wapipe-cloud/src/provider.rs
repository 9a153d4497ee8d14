// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Direct Graph API provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{debug, warn};
use wapipe_config::CloudApiSettings;
use wapipe_core::types::{
    AccountStatus, AvailableNumber, NumberQuery, ProvisionRequest, ProvisionedNumber,
    TemplateMessage, UsagePeriod, UsageStats, VerificationMethod, WebhookConfig,
};
use wapipe_core::{
    AdapterType, Capability, HealthStatus, InboundMessage, MessagePayload, MessageStatusUpdate,
    OutboundMessage, PluginAdapter, ProviderAdapter, ProviderKind, SendFailure, SendOutcome,
    WapipeError, verify_hmac_sha256,
};

use crate::{classify, webhook, wire};

/// Header Meta signs webhook payloads with.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const ACCOUNT_FIELDS: &str =
    "display_phone_number,verified_name,quality_rating,messaging_limit_tier,name_status,status";

/// WhatsApp Cloud API adapter for one business phone number.
///
/// Number provisioning and verification happen in Meta's own tooling, so
/// those operations report [`Capability::Unsupported`].
#[derive(Clone)]
pub struct CloudApiProvider {
    client: reqwest::Client,
    settings: CloudApiSettings,
}

impl CloudApiProvider {
    pub fn new(settings: CloudApiSettings) -> Result<Self, WapipeError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", settings.access_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| WapipeError::Config(format!("invalid access token header: {e}")))?,
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

        Ok(Self { client, settings })
    }

    fn graph_url(&self, node: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.api_version,
            node
        )
    }

    fn messages_url(&self) -> String {
        self.graph_url(&format!("{}/messages", self.settings.phone_number_id))
    }

    /// GET a Graph node and decode it, mapping API errors to `Provider`.
    async fn get_node<T: for<'de> Deserialize<'de>>(
        &self,
        node: &str,
        fields: &str,
    ) -> Result<T, WapipeError> {
        let response = self
            .client
            .get(self.graph_url(node))
            .query(&[("fields", fields)])
            .send()
            .await
            .map_err(|e| WapipeError::Provider {
                message: format!("Graph API request failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let (code, message) = classify::parse_error(status.as_u16(), &body);
            return Err(WapipeError::provider(match code {
                Some(code) => format!("Graph API error ({code}): {message}"),
                None => format!("Graph API error: {message}"),
            }));
        }
        serde_json::from_str(&body).map_err(|e| WapipeError::Provider {
            message: format!("failed to parse Graph API response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

impl std::fmt::Debug for CloudApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudApiProvider")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct PhoneNumberNode {
    #[serde(default)]
    display_phone_number: Option<String>,
    #[serde(default)]
    verified_name: Option<String>,
    #[serde(default)]
    quality_rating: Option<String>,
    #[serde(default)]
    messaging_limit_tier: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyticsNode {
    #[serde(default)]
    analytics: Option<Analytics>,
}

#[derive(Debug, Deserialize)]
struct Analytics {
    #[serde(default)]
    data_points: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
struct DataPoint {
    #[serde(default)]
    sent: u64,
    #[serde(default)]
    delivered: u64,
}

#[async_trait]
impl PluginAdapter for CloudApiProvider {
    fn name(&self) -> &str {
        "cloud-api"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, WapipeError> {
        if self.settings.access_token.is_empty() {
            return Ok(HealthStatus::Unhealthy("access token not configured".into()));
        }
        if self.settings.app_secret.is_none() {
            return Ok(HealthStatus::Degraded(
                "app secret not configured; webhooks will be rejected".into(),
            ));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WapipeError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for CloudApiProvider {
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
        if let Err(reason) = wire::validate(message) {
            return SendOutcome::Failed(SendFailure::invalid(reason));
        }
        let body = wire::message_body(message);
        let response = match self.client.post(self.messages_url()).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                let failure = classify::transport_failure(&e);
                warn!(code = %failure.code, retryable = failure.retryable, "cloud api send failed: {e}");
                return SendOutcome::Failed(failure);
            }
        };
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let outcome = classify::send_outcome(status, &text);
        debug!(status, kind = message.message_type(), sent = outcome.is_sent(), "cloud api send");
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
            verify_token: self.settings.verify_token.clone(),
            subscribed_fields: vec![webhook::MESSAGES_FIELD],
            secret_configured: self.settings.app_secret.is_some(),
        }
    }

    /// Without an app secret nothing can be verified, so every payload is
    /// rejected.
    fn verify_webhook_signature(&self, payload: &[u8], signature: Option<&str>) -> bool {
        let Some(secret) = self.settings.app_secret.as_deref() else {
            warn!(
                phone_number_id = %self.settings.phone_number_id,
                "cloud api app secret not configured, rejecting webhook"
            );
            return false;
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
        let node: PhoneNumberNode = self
            .get_node(&self.settings.phone_number_id, ACCOUNT_FIELDS)
            .await?;
        Ok(Capability::Supported(AccountStatus {
            connected: node
                .status
                .as_deref()
                .is_none_or(|s| s.eq_ignore_ascii_case("connected")),
            display_phone_number: node.display_phone_number,
            verified_name: node.verified_name,
            quality_rating: node.quality_rating,
            messaging_limit: node.messaging_limit_tier,
            status: node.status,
        }))
    }

    async fn usage_stats(
        &self,
        period: UsagePeriod,
    ) -> Result<Capability<UsageStats>, WapipeError> {
        let Some(waba) = self.settings.business_account_id.as_deref() else {
            return Ok(Capability::unsupported(self.kind(), "usage_stats"));
        };
        let fields = format!(
            "analytics.start({}).end({}).granularity(DAY)",
            period.start.timestamp(),
            period.end.timestamp()
        );
        let node: AnalyticsNode = self.get_node(waba, &fields).await?;
        let points = node.analytics.map(|a| a.data_points).unwrap_or_default();
        Ok(Capability::Supported(UsageStats {
            period,
            sent: points.iter().map(|p| p.sent).sum(),
            delivered: points.iter().map(|p| p.delivered).sum(),
            read: None,
            failed: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use tracing_test::traced_test;
    use wapipe_core::sign_hmac_sha256;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> CloudApiSettings {
        CloudApiSettings {
            access_token: "test-token".into(),
            phone_number_id: "PHONE_ID".into(),
            business_account_id: Some("WABA_ID".into()),
            app_secret: Some("app-secret".into()),
            verify_token: Some("verify-me".into()),
            api_version: "v21.0".into(),
            base_url: base_url.to_string(),
        }
    }

    fn provider(server: &MockServer) -> CloudApiProvider {
        CloudApiProvider::new(settings(&server.uri())).unwrap()
    }

    fn text_message() -> OutboundMessage {
        OutboundMessage {
            to: "15550001111".into(),
            content: MessagePayload::text("hello"),
            idempotency_key: Some("order-42".into()),
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn send_posts_to_phone_number_messages_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v21.0/PHONE_ID/messages"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "messaging_product": "whatsapp",
                "to": "15550001111",
                "type": "text",
                "biz_opaque_callback_data": "order-42",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "messages": [{ "id": "wamid.OUT" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = provider(&server).send_message(&text_message()).await;
        assert_eq!(
            outcome,
            SendOutcome::Sent {
                provider_message_id: "wamid.OUT".into()
            }
        );
    }

    #[tokio::test]
    async fn throttled_send_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "(#130429) Rate limit hit", "type": "OAuthException", "code": 130429 }
            })))
            .mount(&server)
            .await;

        match provider(&server).send_message(&text_message()).await {
            SendOutcome::Failed(failure) => {
                assert_eq!(failure.code, "130429");
                assert!(failure.retryable);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_failure_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Invalid OAuth access token", "type": "OAuthException", "code": 190 }
            })))
            .mount(&server)
            .await;

        match provider(&server).send_message(&text_message()).await {
            SendOutcome::Failed(failure) => {
                assert_eq!(failure.code, "190");
                assert!(!failure.retryable);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_message_never_reaches_the_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut message = text_message();
        message.content = MessagePayload::text("");
        match provider(&server).send_message(&message).await {
            SendOutcome::Failed(failure) => assert!(!failure.retryable),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_retryable() {
        let provider = CloudApiProvider::new(settings("http://127.0.0.1:1")).unwrap();
        match provider.send_message(&text_message()).await {
            SendOutcome::Failed(failure) => assert!(failure.retryable, "{failure}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn template_send_builds_template_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "type": "template",
                "template": { "name": "hello_world", "language": { "code": "en_US" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "wamid.TPL" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let template = TemplateMessage {
            name: "hello_world".into(),
            language: "en_US".into(),
            components: vec![],
        };
        let outcome = provider(&server).send_template("15550001111", &template).await;
        assert!(outcome.is_sent());
    }

    #[tokio::test]
    async fn provisioning_is_unsupported_not_an_error() {
        let server = MockServer::start().await;
        let provider = provider(&server);
        assert!(!provider.supports_provisioning());
        let result = provider
            .provision_number(&ProvisionRequest {
                phone_number: "15550003333".into(),
                display_name: "Acme".into(),
                tenant_id: "acme".into(),
            })
            .await
            .unwrap();
        match result {
            Capability::Unsupported(op) => {
                assert_eq!(op.to_string(), "cloud_api does not support provision_number")
            }
            Capability::Supported(_) => panic!("cloud api cannot provision"),
        }
        assert!(
            !provider
                .verify_code("PHONE_ID", "123456")
                .await
                .unwrap()
                .is_supported()
        );
    }

    #[tokio::test]
    async fn account_status_reads_phone_number_node() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v21.0/PHONE_ID"))
            .and(query_param("fields", ACCOUNT_FIELDS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "display_phone_number": "+1 555-000-9999",
                "verified_name": "Acme Dental",
                "quality_rating": "GREEN",
                "messaging_limit_tier": "TIER_1K",
                "status": "CONNECTED",
                "id": "PHONE_ID"
            })))
            .mount(&server)
            .await;

        let status = provider(&server)
            .account_status()
            .await
            .unwrap()
            .supported()
            .unwrap();
        assert!(status.connected);
        assert_eq!(status.verified_name.as_deref(), Some("Acme Dental"));
        assert_eq!(status.messaging_limit.as_deref(), Some("TIER_1K"));
    }

    #[tokio::test]
    async fn account_status_error_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Unsupported get request", "code": 100 }
            })))
            .mount(&server)
            .await;

        let err = provider(&server).account_status().await.unwrap_err();
        assert!(err.to_string().contains("Unsupported get request"), "{err}");
    }

    #[tokio::test]
    async fn usage_sums_analytics_data_points() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v21.0/WABA_ID"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "analytics": {
                    "phone_numbers": ["15550009999"],
                    "granularity": "DAY",
                    "data_points": [
                        { "start": 1700000000, "end": 1700086400, "sent": 10, "delivered": 9 },
                        { "start": 1700086400, "end": 1700172800, "sent": 5, "delivered": 5 }
                    ]
                },
                "id": "WABA_ID"
            })))
            .mount(&server)
            .await;

        let period = UsagePeriod {
            start: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            end: DateTime::<Utc>::from_timestamp(1_700_172_800, 0).unwrap(),
        };
        let usage = provider(&server)
            .usage_stats(period)
            .await
            .unwrap()
            .supported()
            .unwrap();
        assert_eq!(usage.sent, 15);
        assert_eq!(usage.delivered, 14);
    }

    #[test]
    fn signature_checks_app_secret() {
        let provider = CloudApiProvider::new(settings("http://unused")).unwrap();
        let body = br#"{"object":"whatsapp_business_account","entry":[]}"#;
        let signature = sign_hmac_sha256(body, b"app-secret");

        assert!(provider.verify_webhook_signature(body, Some(&signature)));
        assert!(!provider.verify_webhook_signature(b"{\"object\":\"x\"}", Some(&signature)));
        assert!(!provider.verify_webhook_signature(body, None));
    }

    #[test]
    #[traced_test]
    fn missing_app_secret_rejects_with_a_warning() {
        let provider = CloudApiProvider::new(CloudApiSettings {
            app_secret: None,
            ..settings("http://unused")
        })
        .unwrap();
        let body = b"{}";
        let signature = sign_hmac_sha256(body, b"anything");
        assert!(!provider.verify_webhook_signature(body, Some(&signature)));
        assert!(!provider.webhook_config().secret_configured);
        assert!(logs_contain("app secret not configured"));
    }

    #[test]
    fn webhook_config_names_signature_header() {
        let provider = CloudApiProvider::new(settings("http://unused")).unwrap();
        let config = provider.webhook_config();
        assert_eq!(config.signature_header, Some("x-hub-signature-256"));
        assert_eq!(config.verify_token.as_deref(), Some("verify-me"));
        assert_eq!(config.subscribed_fields, vec!["messages"]);
    }
}
