// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for WhatsApp messaging providers.

use async_trait::async_trait;

use crate::error::WapipeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AccountStatus, AvailableNumber, Capability, InboundMessage, MessageStatusUpdate, NumberQuery,
    OutboundMessage, ProviderKind, ProvisionRequest, ProvisionedNumber, SendOutcome,
    TemplateMessage, UsagePeriod, UsageStats, VerificationMethod, WebhookConfig,
};

/// Uniform surface over every messaging provider.
///
/// Optional operations a provider cannot perform return
/// [`Capability::Unsupported`]; callers branch on the capability checks or
/// the value, never on an error. Send failures are likewise values ([`SendOutcome`]) so
/// the dispatcher can classify them. `Err` is reserved for infrastructure
/// faults such as a malformed response on a management endpoint.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    fn kind(&self) -> ProviderKind;

    // --- Capability checks ---

    fn supports_provisioning(&self) -> bool;
    fn supports_templates(&self) -> bool;
    fn supports_interactive(&self) -> bool;
    fn supports_media(&self) -> bool;

    // --- Number management ---

    async fn available_numbers(
        &self,
        query: &NumberQuery,
    ) -> Result<Capability<Vec<AvailableNumber>>, WapipeError>;

    async fn provision_number(
        &self,
        request: &ProvisionRequest,
    ) -> Result<Capability<ProvisionedNumber>, WapipeError>;

    async fn release_number(&self, number_id: &str) -> Result<Capability<()>, WapipeError>;

    async fn send_verification_code(
        &self,
        number_id: &str,
        method: VerificationMethod,
    ) -> Result<Capability<()>, WapipeError>;

    async fn verify_code(&self, number_id: &str, code: &str)
    -> Result<Capability<bool>, WapipeError>;

    // --- Messaging ---

    /// Sends any canonical message.
    async fn send_message(&self, message: &OutboundMessage) -> SendOutcome;

    /// Sends a template message to `to`.
    async fn send_template(&self, to: &str, template: &TemplateMessage) -> SendOutcome;

    // --- Webhooks ---

    fn webhook_config(&self) -> WebhookConfig;

    /// Verifies the signature of a raw webhook body.
    fn verify_webhook_signature(&self, payload: &[u8], signature: Option<&str>) -> bool;

    /// Extracts the first inbound message from a raw webhook body.
    fn parse_inbound_message(&self, payload: &[u8]) -> Option<InboundMessage>;

    /// Extracts the first delivery status from a raw webhook body.
    fn parse_status_update(&self, payload: &[u8]) -> Option<MessageStatusUpdate>;

    // --- Account ---

    async fn account_status(&self) -> Result<Capability<AccountStatus>, WapipeError>;

    async fn usage_stats(
        &self,
        period: UsagePeriod,
    ) -> Result<Capability<UsageStats>, WapipeError>;
}
