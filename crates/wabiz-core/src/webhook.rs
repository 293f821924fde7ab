//! Meta webhook envelope (`object / entry[] / changes[] / value`) and its
//! normalization into [`WebhookEvent`]s.
//!
//! Unknown fields, change kinds and status names are tolerated: they either
//! deserialize to defaults or surface as [`WebhookEvent::Unsupported`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::messages::MessageKind;
use crate::phone::normalize_phone;
use crate::status::MessageStatus;

pub const WHATSAPP_OBJECT: &str = "whatsapp_business_account";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook JSON parse: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected webhook object: {0}")]
    UnexpectedObject(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: WebhookValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub metadata: WebhookMetadata,
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub messages: Vec<RawInboundMessage>,
    #[serde(default)]
    pub statuses: Vec<RawStatus>,
    #[serde(default)]
    pub errors: Vec<RawError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookMetadata {
    #[serde(default)]
    pub display_phone_number: Option<String>,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookContact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<WebhookProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookProfile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInboundMessage {
    pub id: String,
    pub from: String,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub timestamp: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<RawText>,
    #[serde(default)]
    pub image: Option<RawMedia>,
    #[serde(default)]
    pub video: Option<RawMedia>,
    #[serde(default)]
    pub audio: Option<RawMedia>,
    #[serde(default)]
    pub document: Option<RawMedia>,
    #[serde(default)]
    pub sticker: Option<RawMedia>,
    #[serde(default)]
    pub location: Option<RawLocation>,
    #[serde(default)]
    pub button: Option<RawButton>,
    #[serde(default)]
    pub interactive: Option<RawInteractive>,
    #[serde(default)]
    pub context: Option<RawContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawText {
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMedia {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawButton {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInteractive {
    #[serde(default)]
    pub button_reply: Option<RawReply>,
    #[serde(default)]
    pub list_reply: Option<RawReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReply {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawContext {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStatus {
    pub id: String,
    pub status: String,
    #[serde(default, deserialize_with = "flexible_timestamp")]
    pub timestamp: i64,
    #[serde(default)]
    pub recipient_id: String,
    #[serde(default)]
    pub errors: Vec<RawError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RawError {
    pub fn describe(&self) -> String {
        match (&self.title, &self.message) {
            (Some(title), Some(message)) if title != message => format!("{}: {}", title, message),
            (_, Some(message)) => message.clone(),
            (Some(title), None) => title.clone(),
            (None, None) => format!("error code {}", self.code),
        }
    }
}

/// Graph timestamps are unix seconds encoded as strings; accept bare numbers too.
fn flexible_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub phone_number_id: String,
    pub provider_message_id: String,
    pub status: MessageStatus,
    pub timestamp: i64,
    pub recipient_id: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    pub phone_number_id: String,
    pub display_phone_number: Option<String>,
    pub from: String,
    pub profile_name: Option<String>,
    pub provider_message_id: String,
    pub timestamp: i64,
    pub kind: MessageKind,
    pub body: Option<String>,
    pub media_id: Option<String>,
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub context_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookFailure {
    pub phone_number_id: String,
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WebhookEvent {
    Status(StatusUpdate),
    Message(InboundMessage),
    Error(WebhookFailure),
    Unsupported { field: String, detail: String },
}

/// Parse a raw webhook POST body into normalized events.
///
/// A single delivery can batch several entries and changes; events come out in
/// payload order.
pub fn parse_webhook(raw_body: &[u8]) -> Result<Vec<WebhookEvent>, WebhookError> {
    let payload: WebhookPayload = serde_json::from_slice(raw_body)?;
    if payload.object != WHATSAPP_OBJECT {
        return Err(WebhookError::UnexpectedObject(payload.object));
    }

    let mut events = Vec::new();
    for entry in payload.entry {
        for change in entry.changes {
            if change.field != "messages" {
                events.push(WebhookEvent::Unsupported {
                    field: change.field,
                    detail: entry.id.clone(),
                });
                continue;
            }
            collect_change(change.value, &mut events);
        }
    }
    Ok(events)
}

fn collect_change(value: WebhookValue, events: &mut Vec<WebhookEvent>) {
    let phone_number_id = value.metadata.phone_number_id.clone();

    for err in &value.errors {
        events.push(WebhookEvent::Error(WebhookFailure {
            phone_number_id: phone_number_id.clone(),
            code: err.code,
            message: err.describe(),
        }));
    }

    for raw in value.statuses {
        match raw.status.parse::<MessageStatus>() {
            Ok(status) => events.push(WebhookEvent::Status(StatusUpdate {
                phone_number_id: phone_number_id.clone(),
                provider_message_id: raw.id,
                status,
                timestamp: raw.timestamp,
                recipient_id: raw.recipient_id,
                error: raw.errors.first().map(RawError::describe),
            })),
            Err(_) => events.push(WebhookEvent::Unsupported {
                field: "statuses".to_string(),
                detail: raw.status,
            }),
        }
    }

    for raw in value.messages {
        let profile_name = value
            .contacts
            .iter()
            .find(|c| c.wa_id == raw.from)
            .or(value.contacts.first())
            .and_then(|c| c.profile.as_ref())
            .and_then(|p| p.name.clone());

        match normalize_inbound(raw, &phone_number_id, &value.metadata.display_phone_number) {
            Ok(mut msg) => {
                msg.profile_name = profile_name;
                events.push(WebhookEvent::Message(msg));
            }
            Err(kind) => events.push(WebhookEvent::Unsupported {
                field: "messages".to_string(),
                detail: kind,
            }),
        }
    }
}

fn normalize_inbound(
    raw: RawInboundMessage,
    phone_number_id: &str,
    display_phone_number: &Option<String>,
) -> Result<InboundMessage, String> {
    let kind = MessageKind::parse(&raw.kind).ok_or_else(|| raw.kind.clone())?;

    let media = match kind {
        MessageKind::Image => raw.image.as_ref(),
        MessageKind::Video => raw.video.as_ref(),
        MessageKind::Audio => raw.audio.as_ref(),
        MessageKind::Document => raw.document.as_ref(),
        MessageKind::Sticker => raw.sticker.as_ref(),
        _ => None,
    };

    let body = match kind {
        MessageKind::Text => raw.text.as_ref().map(|t| t.body.clone()),
        MessageKind::Location => raw.location.as_ref().map(|l| {
            let mut text = format!("{},{}", l.latitude, l.longitude);
            if let Some(name) = l.name.as_ref().or(l.address.as_ref()) {
                text.push(' ');
                text.push_str(name);
            }
            text
        }),
        MessageKind::Interactive => raw
            .button
            .as_ref()
            .and_then(|b| b.text.clone().or_else(|| b.payload.clone()))
            .or_else(|| {
                raw.interactive.as_ref().and_then(|i| {
                    i.button_reply
                        .as_ref()
                        .or(i.list_reply.as_ref())
                        .and_then(|r| r.title.clone().or_else(|| r.id.clone()))
                })
            }),
        _ => media.and_then(|m| m.caption.clone()),
    };

    if kind.is_media() && media.and_then(|m| m.id.as_ref()).is_none() {
        return Err(format!("{} without media id", raw.kind));
    }

    Ok(InboundMessage {
        phone_number_id: phone_number_id.to_string(),
        display_phone_number: display_phone_number.clone(),
        from: normalize_phone(&raw.from),
        profile_name: None,
        provider_message_id: raw.id,
        timestamp: raw.timestamp,
        kind,
        body,
        media_id: media.and_then(|m| m.id.clone()),
        mime_type: media.and_then(|m| m.mime_type.clone()),
        filename: media.and_then(|m| m.filename.clone()),
        context_message_id: raw.context.and_then(|c| c.id),
    })
}
