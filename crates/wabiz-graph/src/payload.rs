//! Request bodies for `POST /{phone_number_id}/messages`.

use serde_json::{Value, json};
use wabiz_core::MessageKind;

/// Where an outbound media item comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// An id returned by a previous upload.
    Id(String),
    /// A public link the provider fetches itself.
    Link(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundBody {
    Text {
        body: String,
        preview_url: bool,
    },
    Media {
        kind: MessageKind,
        source: MediaSource,
        caption: Option<String>,
        filename: Option<String>,
    },
    /// Already-converted `template` object (`name`, `language`, `components`).
    Template(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub to: String,
    pub body: OutboundBody,
    /// Provider id of the message being replied to.
    pub reply_to: Option<String>,
}

impl OutboundRequest {
    pub fn text(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            body: OutboundBody::Text {
                body: body.into(),
                preview_url: false,
            },
            reply_to: None,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match &self.body {
            OutboundBody::Text { .. } => MessageKind::Text,
            OutboundBody::Media { kind, .. } => *kind,
            OutboundBody::Template(_) => MessageKind::Template,
        }
    }

    pub fn to_graph_json(&self) -> Value {
        let mut payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": self.to,
        });

        match &self.body {
            OutboundBody::Text { body, preview_url } => {
                payload["type"] = json!("text");
                payload["text"] = json!({ "body": body, "preview_url": preview_url });
            }
            OutboundBody::Media {
                kind,
                source,
                caption,
                filename,
            } => {
                let mut media = match source {
                    MediaSource::Id(id) => json!({ "id": id }),
                    MediaSource::Link(link) => json!({ "link": link }),
                };
                // captions are rejected on audio and stickers
                if let Some(caption) = caption {
                    if !matches!(kind, MessageKind::Audio | MessageKind::Sticker) {
                        media["caption"] = json!(caption);
                    }
                }
                if let (MessageKind::Document, Some(name)) = (kind, filename) {
                    media["filename"] = json!(name);
                }
                payload["type"] = json!(kind.as_str());
                payload[kind.as_str()] = media;
            }
            OutboundBody::Template(template) => {
                payload["type"] = json!("template");
                payload["template"] = template.clone();
            }
        }

        if let Some(reply_to) = &self.reply_to {
            payload["context"] = json!({ "message_id": reply_to });
        }

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_with_reply_context() {
        let mut req = OutboundRequest::text("15550002222", "hi");
        req.reply_to = Some("wamid.X".into());

        let body = req.to_graph_json();
        assert_eq!(body["messaging_product"], "whatsapp");
        assert_eq!(body["type"], "text");
        assert_eq!(body["text"]["body"], "hi");
        assert_eq!(body["context"]["message_id"], "wamid.X");
    }

    #[test]
    fn document_keeps_filename_and_caption() {
        let req = OutboundRequest {
            to: "15550002222".into(),
            body: OutboundBody::Media {
                kind: MessageKind::Document,
                source: MediaSource::Id("media-1".into()),
                caption: Some("invoice".into()),
                filename: Some("invoice.pdf".into()),
            },
            reply_to: None,
        };

        let body = req.to_graph_json();
        assert_eq!(body["type"], "document");
        assert_eq!(body["document"], json!({ "id": "media-1", "caption": "invoice", "filename": "invoice.pdf" }));
        assert!(body.get("context").is_none());
    }

    #[test]
    fn audio_drops_caption() {
        let req = OutboundRequest {
            to: "1".into(),
            body: OutboundBody::Media {
                kind: MessageKind::Audio,
                source: MediaSource::Link("https://cdn.example.com/a.ogg".into()),
                caption: Some("ignored".into()),
                filename: None,
            },
            reply_to: None,
        };
        assert_eq!(req.to_graph_json()["audio"], json!({ "link": "https://cdn.example.com/a.ogg" }));
    }
}
