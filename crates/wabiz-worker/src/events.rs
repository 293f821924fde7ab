use serde::Serialize;
use wabiz_db::{Chat, Message};

/// Real-time notification pushed to a user's channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum PushEvent {
    NewMessage {
        #[serde(skip_serializing_if = "Option::is_none")]
        chat: Option<Chat>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
    },
    MessageStatusUpdate {
        message: Message,
    },
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::NewMessage { .. } => "new-message",
            PushEvent::MessageStatusUpdate { .. } => "message-status-update",
        }
    }

    /// The `data` half of the event, without the name.
    pub fn data(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(mut value) => value["data"].take(),
            Err(_) => serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_names_the_event() {
        let event = PushEvent::NewMessage {
            chat: None,
            message: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "new-message");
        assert_eq!(event.data(), serde_json::json!({}));
    }
}
