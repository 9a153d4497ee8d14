// SPDX-FileCopyrightText: 2026 Wapipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound message bodies in the Cloud API schema.

use serde_json::{Map, Value, json};
use wapipe_core::types::{
    InteractiveKind, InteractiveMessage, MediaKind, MediaMessage, TemplateMessage,
};
use wapipe_core::{MessagePayload, OutboundMessage};

pub const MAX_TEXT_LEN: usize = 4096;
pub const MAX_REPLY_BUTTONS: usize = 3;
pub const MAX_LIST_ROWS: usize = 10;

/// Checks the limits the API enforces, so malformed messages fail
/// without a round trip.
pub fn validate(message: &OutboundMessage) -> Result<(), String> {
    if message.to.is_empty() {
        return Err("recipient is empty".into());
    }
    match &message.content {
        MessagePayload::Text { body, .. } => {
            if body.trim().is_empty() {
                return Err("text body is empty".into());
            }
            if body.chars().count() > MAX_TEXT_LEN {
                return Err(format!("text body exceeds {MAX_TEXT_LEN} characters"));
            }
        }
        MessagePayload::Template(template) => {
            if template.name.is_empty() || template.language.is_empty() {
                return Err("template name and language are required".into());
            }
        }
        MessagePayload::Interactive(interactive) => validate_interactive(interactive)?,
        MessagePayload::Media(media) => {
            if media.link.is_none() && media.id.is_none() {
                return Err(format!("{} message needs a link or media id", media.kind.as_str()));
            }
        }
    }
    Ok(())
}

fn validate_interactive(interactive: &InteractiveMessage) -> Result<(), String> {
    if interactive.body.trim().is_empty() {
        return Err("interactive body is empty".into());
    }
    match interactive.kind {
        InteractiveKind::Button => {
            let n = interactive.buttons.len();
            if n == 0 || n > MAX_REPLY_BUTTONS {
                return Err(format!(
                    "button message needs 1 to {MAX_REPLY_BUTTONS} buttons, got {n}"
                ));
            }
        }
        InteractiveKind::List => {
            let rows: usize = interactive.sections.iter().map(|s| s.rows.len()).sum();
            if rows == 0 || rows > MAX_LIST_ROWS {
                return Err(format!(
                    "list message needs 1 to {MAX_LIST_ROWS} rows, got {rows}"
                ));
            }
        }
    }
    Ok(())
}

/// Request body for `POST /messages`.
///
/// Replies carry `context.message_id`; the idempotency key rides along as
/// `biz_opaque_callback_data` and comes back on status callbacks.
pub fn message_body(message: &OutboundMessage) -> Value {
    let mut body = Map::new();
    body.insert("messaging_product".into(), json!("whatsapp"));
    body.insert("recipient_type".into(), json!("individual"));
    body.insert("to".into(), json!(message.to));
    body.insert("type".into(), json!(message.message_type()));
    body.insert(message.message_type().into(), content(&message.content));
    if let Some(reply_to) = &message.reply_to {
        body.insert("context".into(), json!({ "message_id": reply_to }));
    }
    if let Some(key) = &message.idempotency_key {
        body.insert("biz_opaque_callback_data".into(), json!(key));
    }
    Value::Object(body)
}

fn content(payload: &MessagePayload) -> Value {
    match payload {
        MessagePayload::Text { body, preview_url } => json!({
            "body": body,
            "preview_url": preview_url,
        }),
        MessagePayload::Template(template) => template_content(template),
        MessagePayload::Interactive(interactive) => interactive_content(interactive),
        MessagePayload::Media(media) => media_content(media),
    }
}

fn template_content(template: &TemplateMessage) -> Value {
    let mut content = Map::new();
    content.insert("name".into(), json!(template.name));
    content.insert("language".into(), json!({ "code": template.language }));
    if !template.components.is_empty() {
        content.insert("components".into(), json!(template.components));
    }
    Value::Object(content)
}

fn interactive_content(interactive: &InteractiveMessage) -> Value {
    let mut content = Map::new();
    let kind = match interactive.kind {
        InteractiveKind::Button => "button",
        InteractiveKind::List => "list",
    };
    content.insert("type".into(), json!(kind));
    if let Some(header) = &interactive.header {
        content.insert("header".into(), json!({ "type": "text", "text": header }));
    }
    content.insert("body".into(), json!({ "text": interactive.body }));
    if let Some(footer) = &interactive.footer {
        content.insert("footer".into(), json!({ "text": footer }));
    }

    let action = match interactive.kind {
        InteractiveKind::Button => {
            let buttons: Vec<Value> = interactive
                .buttons
                .iter()
                .map(|b| json!({ "type": "reply", "reply": { "id": b.id, "title": b.title } }))
                .collect();
            json!({ "buttons": buttons })
        }
        InteractiveKind::List => {
            let sections: Vec<Value> = interactive
                .sections
                .iter()
                .map(|section| {
                    let rows: Vec<Value> = section
                        .rows
                        .iter()
                        .map(|row| {
                            let mut r = Map::new();
                            r.insert("id".into(), json!(row.id));
                            r.insert("title".into(), json!(row.title));
                            if let Some(description) = &row.description {
                                r.insert("description".into(), json!(description));
                            }
                            Value::Object(r)
                        })
                        .collect();
                    let mut s = Map::new();
                    if let Some(title) = &section.title {
                        s.insert("title".into(), json!(title));
                    }
                    s.insert("rows".into(), Value::Array(rows));
                    Value::Object(s)
                })
                .collect();
            json!({
                "button": interactive.list_button.as_deref().unwrap_or("Options"),
                "sections": sections,
            })
        }
    };
    content.insert("action".into(), action);
    Value::Object(content)
}

fn media_content(media: &MediaMessage) -> Value {
    let mut content = Map::new();
    if let Some(id) = &media.id {
        content.insert("id".into(), json!(id));
    } else if let Some(link) = &media.link {
        content.insert("link".into(), json!(link));
    }
    if media.kind.accepts_caption()
        && let Some(caption) = &media.caption
    {
        content.insert("caption".into(), json!(caption));
    }
    if media.kind == MediaKind::Document
        && let Some(filename) = &media.filename
    {
        content.insert("filename".into(), json!(filename));
    }
    Value::Object(content)
}
