// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical types shared by the queue, the limiter, and every provider adapter.
//!
//! Outbound payload types serialize directly into the Cloud API JSON shape
//! where the two coincide (template components and parameters), so adapters
//! can embed them without a second translation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Store,
}

/// The closed set of messaging providers the pipeline can talk to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Direct Cloud API access with a business's own credentials.
    CloudApi,
    /// 360dialog BSP with partner-level number provisioning.
    Dialog360,
}

// --- Queue model ---

/// Dispatch priority. Lower rank is served first.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent = 0,
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl Priority {
    /// All priorities in dispatch order.
    pub const ALL: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Numeric rank used for storage ordering.
    pub fn rank(self) -> i64 {
        self as i64
    }

    /// Inverse of [`Priority::rank`].
    pub fn from_rank(rank: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.rank() == rank)
    }
}

/// Lifecycle status of a queued message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    RateLimited,
    Sending,
    Sent,
    Failed,
    Expired,
}

impl MessageStatus {
    pub const ALL: [MessageStatus; 6] = [
        MessageStatus::Queued,
        MessageStatus::RateLimited,
        MessageStatus::Sending,
        MessageStatus::Sent,
        MessageStatus::Failed,
        MessageStatus::Expired,
    ];

    /// Terminal statuses end queue ownership of a message.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Sent | MessageStatus::Failed | MessageStatus::Expired
        )
    }

    /// Statuses the dispatcher may still pick up.
    pub fn is_pending(self) -> bool {
        matches!(self, MessageStatus::Queued | MessageStatus::RateLimited)
    }
}

/// A message owned by the queue until it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Destination phone number in E.164 digits.
    pub to: String,
    pub payload: MessagePayload,
    pub priority: Priority,
    pub status: MessageStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    /// Earliest time the message may be sent.
    pub scheduled_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub provider_message_id: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl QueuedMessage {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Builds the provider-facing message for this queue entry.
    pub fn to_outbound(&self) -> OutboundMessage {
        OutboundMessage {
            to: self.to.clone(),
            content: self.payload.clone(),
            idempotency_key: Some(
                self.idempotency_key
                    .clone()
                    .unwrap_or_else(|| self.id.clone()),
            ),
            reply_to: self.reply_to.clone(),
        }
    }
}

// --- Outbound canonical model ---

/// Canonical outbound message handed to a provider adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub content: MessagePayload,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Provider message id this message replies to.
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    pub fn message_type(&self) -> &'static str {
        self.content.message_type()
    }
}

/// Message content variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Text {
        body: String,
        #[serde(default)]
        preview_url: bool,
    },
    Template(TemplateMessage),
    Interactive(InteractiveMessage),
    Media(MediaMessage),
}

impl MessagePayload {
    pub fn text(body: impl Into<String>) -> Self {
        MessagePayload::Text {
            body: body.into(),
            preview_url: false,
        }
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            MessagePayload::Text { .. } => "text",
            MessagePayload::Template(_) => "template",
            MessagePayload::Interactive(_) => "interactive",
            MessagePayload::Media(m) => m.kind.as_str(),
        }
    }
}

/// A pre-approved template message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMessage {
    pub name: String,
    /// Template language code, e.g. `en_US`.
    pub language: String,
    #[serde(default)]
    pub components: Vec<TemplateComponent>,
}

/// A template component (`header`, `body`, `button`) with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TemplateParameter {
    Text { text: String },
    Currency { currency: CurrencyValue },
    DateTime { date_time: DateTimeValue },
    Image { image: MediaLink },
    Document { document: MediaLink },
    Video { video: MediaLink },
    Payload { payload: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyValue {
    pub fallback_value: String,
    pub code: String,
    pub amount_1000: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateTimeValue {
    pub fallback_value: String,
}

/// Reference to hosted or previously uploaded media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractiveKind {
    Button,
    List,
}

/// Reply-button or list message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveMessage {
    pub kind: InteractiveKind,
    #[serde(default)]
    pub header: Option<String>,
    pub body: String,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub buttons: Vec<ReplyButton>,
    /// Label of the button that opens a list message.
    #[serde(default)]
    pub list_button: Option<String>,
    #[serde(default)]
    pub sections: Vec<ListSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyButton {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSection {
    #[serde(default)]
    pub title: Option<String>,
    pub rows: Vec<ListRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Document => "document",
            MediaKind::Sticker => "sticker",
        }
    }

    /// Audio and sticker messages reject captions.
    pub fn accepts_caption(self) -> bool {
        matches!(self, MediaKind::Image | MediaKind::Video | MediaKind::Document)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMessage {
    pub kind: MediaKind,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

// --- Inbound canonical model ---

/// A provider-agnostic message received through a webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Provider message id; the natural deduplication key downstream.
    pub provider_message_id: String,
    pub from: String,
    /// Business phone number id the message was addressed to.
    pub to: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub content: InboundContent,
    #[serde(default)]
    pub context: Option<ReplyContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyContext {
    pub message_id: String,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundContent {
    Text {
        body: String,
    },
    Image(InboundMedia),
    Video(InboundMedia),
    Audio(InboundMedia),
    Document(InboundMedia),
    Sticker(InboundMedia),
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        address: Option<String>,
    },
    Contacts {
        contacts: Vec<SharedContact>,
    },
    Reaction {
        message_id: String,
        /// `None` when the customer removed a reaction.
        #[serde(default)]
        emoji: Option<String>,
    },
    Button {
        text: String,
        #[serde(default)]
        payload: Option<String>,
    },
    Interactive {
        reply: InteractiveReply,
    },
}

impl InboundContent {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundContent::Text { .. } => "text",
            InboundContent::Image(_) => "image",
            InboundContent::Video(_) => "video",
            InboundContent::Audio(_) => "audio",
            InboundContent::Document(_) => "document",
            InboundContent::Sticker(_) => "sticker",
            InboundContent::Location { .. } => "location",
            InboundContent::Contacts { .. } => "contacts",
            InboundContent::Reaction { .. } => "reaction",
            InboundContent::Button { .. } => "button",
            InboundContent::Interactive { .. } => "interactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMedia {
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedContact {
    pub name: String,
    #[serde(default)]
    pub phones: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractiveReply {
    ButtonReply {
        id: String,
        title: String,
    },
    ListReply {
        id: String,
        title: String,
        #[serde(default)]
        description: Option<String>,
    },
}

/// Delivery state reported by a status callback.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    Deleted,
}

/// A provider-agnostic delivery status callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStatusUpdate {
    pub provider_message_id: String,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub errors: Vec<ProviderErrorDetail>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub pricing_category: Option<String>,
    /// Opaque data attached at send time (the idempotency key).
    #[serde(default)]
    pub callback_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderErrorDetail {
    pub code: i64,
    pub title: String,
    #[serde(default)]
    pub message: Option<String>,
}

// --- Provider operation results ---

/// Result of a send attempt. Failures are values: the dispatcher decides
/// between retry and terminal failure from `retryable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { provider_message_id: String },
    Failed(SendFailure),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl SendFailure {
    pub fn timeout(after: std::time::Duration) -> Self {
        Self {
            code: "timeout".into(),
            message: format!("provider call timed out after {after:?}"),
            retryable: true,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: "transport".into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: "invalid_message".into(),
            message: message.into(),
            retryable: false,
        }
    }
}

impl std::fmt::Display for SendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of an optional provider operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability<T> {
    Supported(T),
    Unsupported(UnsupportedOperation),
}

impl<T> Capability<T> {
    pub fn unsupported(provider: ProviderKind, operation: &'static str) -> Self {
        Capability::Unsupported(UnsupportedOperation {
            provider,
            operation,
        })
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported(_))
    }

    pub fn supported(self) -> Option<T> {
        match self {
            Capability::Supported(value) => Some(value),
            Capability::Unsupported(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedOperation {
    pub provider: ProviderKind,
    pub operation: &'static str,
}

impl std::fmt::Display for UnsupportedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} does not support {}", self.provider, self.operation)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberQuery {
    pub country_code: String,
    #[serde(default)]
    pub area_code: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableNumber {
    pub phone_number: String,
    pub country_code: String,
    #[serde(default)]
    pub monthly_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub phone_number: String,
    pub display_name: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedNumber {
    pub number_id: String,
    pub phone_number: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationMethod {
    Sms,
    Voice,
}

/// What a provider expects from the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub provider: ProviderKind,
    /// Header carrying the payload signature, if the provider signs payloads.
    pub signature_header: Option<&'static str>,
    /// Token echoed during the subscription handshake.
    pub verify_token: Option<String>,
    pub subscribed_fields: Vec<&'static str>,
    pub secret_configured: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub connected: bool,
    #[serde(default)]
    pub display_phone_number: Option<String>,
    #[serde(default)]
    pub verified_name: Option<String>,
    #[serde(default)]
    pub quality_rating: Option<String>,
    #[serde(default)]
    pub messaging_limit: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub period: UsagePeriod,
    pub sent: u64,
    pub delivered: u64,
    #[serde(default)]
    pub read: Option<u64>,
    #[serde(default)]
    pub failed: Option<u64>,
}
