// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook envelope parsing.
//!
//! Callbacks arrive as `object -> entry[] -> changes[] -> value`. Only
//! changes on the `messages` field are read, and the first message or status
//! that maps onto the canonical model is returned. Anything else, including
//! invalid JSON, yields `None`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use wapipe_core::types::{
    DeliveryStatus, InboundContent, InboundMedia, InteractiveReply, ProviderErrorDetail,
    ReplyContext, SharedContact,
};
use wapipe_core::{InboundMessage, MessageStatusUpdate};

pub const BUSINESS_ACCOUNT_OBJECT: &str = "whatsapp_business_account";
pub const MESSAGES_FIELD: &str = "messages";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    object: String,
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    field: String,
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    statuses: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    display_phone_number: Option<String>,
    #[serde(default)]
    phone_number_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    #[serde(default)]
    wa_id: Option<String>,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    from: String,
    timestamp: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    context: Option<WireContext>,
    #[serde(default)]
    text: Option<WireText>,
    #[serde(default)]
    image: Option<WireMedia>,
    #[serde(default)]
    video: Option<WireMedia>,
    #[serde(default)]
    audio: Option<WireMedia>,
    #[serde(default)]
    document: Option<WireMedia>,
    #[serde(default)]
    sticker: Option<WireMedia>,
    #[serde(default)]
    location: Option<WireLocation>,
    #[serde(default)]
    contacts: Vec<WireContactCard>,
    #[serde(default)]
    reaction: Option<WireReaction>,
    #[serde(default)]
    button: Option<WireButton>,
    #[serde(default)]
    interactive: Option<WireInteractive>,
}

#[derive(Debug, Deserialize)]
struct WireContext {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    from: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    body: String,
}

#[derive(Debug, Deserialize)]
struct WireMedia {
    id: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireContactCard {
    #[serde(default)]
    name: Option<WireContactName>,
    #[serde(default)]
    phones: Vec<WirePhone>,
}

#[derive(Debug, Deserialize)]
struct WireContactName {
    #[serde(default)]
    formatted_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePhone {
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    wa_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReaction {
    message_id: String,
    #[serde(default)]
    emoji: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireButton {
    text: String,
    #[serde(default)]
    payload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireInteractive {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    button_reply: Option<WireChoice>,
    #[serde(default)]
    list_reply: Option<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    id: String,
    status: String,
    timestamp: String,
    recipient_id: String,
    #[serde(default)]
    errors: Vec<WireError>,
    #[serde(default)]
    conversation: Option<WireConversation>,
    #[serde(default)]
    pricing: Option<WirePricing>,
    #[serde(default)]
    biz_opaque_callback_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    code: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireConversation {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WirePricing {
    #[serde(default)]
    category: Option<String>,
}

/// `messages` changes of a business-account envelope.
fn message_changes(payload: &[u8]) -> Vec<ChangeValue> {
    let envelope: Envelope = match serde_json::from_slice(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, "webhook payload is not an envelope");
            return Vec::new();
        }
    };
    if envelope.object != BUSINESS_ACCOUNT_OBJECT {
        debug!(object = %envelope.object, "ignoring webhook for another object");
        return Vec::new();
    }
    envelope
        .entry
        .into_iter()
        .flat_map(|entry| entry.changes)
        .filter(|change| change.field == MESSAGES_FIELD)
        .map(|change| change.value)
        .collect()
}

pub fn parse_inbound_message(payload: &[u8]) -> Option<InboundMessage> {
    message_changes(payload).into_iter().find_map(|value| {
        let business = value.metadata.as_ref().and_then(|m| {
            m.phone_number_id
                .clone()
                .or_else(|| m.display_phone_number.clone())
        });
        value.messages.iter().find_map(|raw| {
            let wire: WireMessage = serde_json::from_value(raw.clone()).ok()?;
            to_inbound(wire, business.clone().unwrap_or_default(), &value.contacts)
        })
    })
}

pub fn parse_status_update(payload: &[u8]) -> Option<MessageStatusUpdate> {
    message_changes(payload).into_iter().find_map(|value| {
        value.statuses.iter().find_map(|raw| {
            let wire: WireStatus = serde_json::from_value(raw.clone()).ok()?;
            to_status(wire)
        })
    })
}

fn timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn media(wire: WireMedia) -> InboundMedia {
    InboundMedia {
        id: wire.id,
        mime_type: wire.mime_type,
        sha256: wire.sha256,
        caption: wire.caption,
        filename: wire.filename,
    }
}

fn to_inbound(wire: WireMessage, to: String, contacts: &[Contact]) -> Option<InboundMessage> {
    if wire.id.is_empty() || wire.from.is_empty() {
        return None;
    }
    let timestamp = timestamp(&wire.timestamp)?;
    let content = match wire.kind.as_str() {
        "text" => InboundContent::Text {
            body: wire.text?.body,
        },
        "image" => InboundContent::Image(media(wire.image?)),
        "video" => InboundContent::Video(media(wire.video?)),
        "audio" | "voice" => InboundContent::Audio(media(wire.audio?)),
        "document" => InboundContent::Document(media(wire.document?)),
        "sticker" => InboundContent::Sticker(media(wire.sticker?)),
        "location" => {
            let location = wire.location?;
            InboundContent::Location {
                latitude: location.latitude,
                longitude: location.longitude,
                name: location.name,
                address: location.address,
            }
        }
        "contacts" => InboundContent::Contacts {
            contacts: wire
                .contacts
                .into_iter()
                .map(|card| SharedContact {
                    name: card
                        .name
                        .and_then(|n| n.formatted_name)
                        .unwrap_or_default(),
                    phones: card
                        .phones
                        .into_iter()
                        .filter_map(|p| p.phone.or(p.wa_id))
                        .collect(),
                })
                .collect(),
        },
        "reaction" => {
            let reaction = wire.reaction?;
            InboundContent::Reaction {
                message_id: reaction.message_id,
                emoji: reaction.emoji.filter(|e| !e.is_empty()),
            }
        }
        "button" => {
            let button = wire.button?;
            InboundContent::Button {
                text: button.text,
                payload: button.payload,
            }
        }
        "interactive" => {
            let interactive = wire.interactive?;
            let reply = match interactive.kind.as_str() {
                "button_reply" => {
                    let choice = interactive.button_reply?;
                    InteractiveReply::ButtonReply {
                        id: choice.id,
                        title: choice.title,
                    }
                }
                "list_reply" => {
                    let choice = interactive.list_reply?;
                    InteractiveReply::ListReply {
                        id: choice.id,
                        title: choice.title,
                        description: choice.description,
                    }
                }
                _ => return None,
            };
            InboundContent::Interactive { reply }
        }
        other => {
            debug!(kind = other, message_id = %wire.id, "unsupported inbound message type");
            return None;
        }
    };

    let contact_name = contacts
        .iter()
        .find(|c| c.wa_id.as_deref() == Some(wire.from.as_str()))
        .or_else(|| contacts.first())
        .and_then(|c| c.profile.as_ref())
        .and_then(|p| p.name.clone());
    let context = wire.context.and_then(|c| {
        c.id.map(|message_id| ReplyContext {
            message_id,
            from: c.from,
        })
    });

    Some(InboundMessage {
        provider_message_id: wire.id,
        from: wire.from,
        to,
        contact_name,
        timestamp,
        content,
        context,
    })
}

fn to_status(wire: WireStatus) -> Option<MessageStatusUpdate> {
    if wire.id.is_empty() {
        return None;
    }
    let status = DeliveryStatus::from_str(&wire.status).ok()?;
    Some(MessageStatusUpdate {
        provider_message_id: wire.id,
        recipient: wire.recipient_id,
        status,
        timestamp: timestamp(&wire.timestamp)?,
        errors: wire
            .errors
            .into_iter()
            .map(|e| ProviderErrorDetail {
                code: e.code,
                title: e.title,
                message: e.message,
            })
            .collect(),
        conversation_id: wire.conversation.map(|c| c.id),
        pricing_category: wire.pricing.and_then(|p| p.category),
        callback_data: wire.biz_opaque_callback_data,
    })
}
