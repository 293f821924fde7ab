use wabiz_core::phone::normalize_phone;
use wabiz_core::webhook::{InboundMessage, WebhookEvent};
use wabiz_core::MessageKind;
use wabiz_db::{Account, Chat, ContactInput, Message, NewInboundMessage};
use wabiz_graph::AutoReplyRequest;

use crate::error::Result;
use crate::events::PushEvent;
use crate::resolver::ChatResolver;
use crate::worker::WabizWorker;

impl WabizWorker {
    /// Handles every event of one webhook delivery, in payload order.
    ///
    /// A failing event is logged and does not stop the ones after it. The first
    /// failure is returned so the delivery gets retried.
    pub async fn process_webhook(&self, events: Vec<WebhookEvent>) -> Result<()> {
        let mut first_error = None;
        for event in events {
            if let Err(e) = self.handle_event(event).await {
                tracing::error!(error = %e, "Error handling webhook event");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn handle_event(&self, event: WebhookEvent) -> Result<()> {
        match event {
            WebhookEvent::Status(update) => {
                self.reconcile_status(&update).await?;
            }
            WebhookEvent::Message(message) => {
                self.receive_message(message).await?;
            }
            WebhookEvent::Error(failure) => {
                tracing::warn!(
                    phone_number_id = %failure.phone_number_id,
                    code = failure.code,
                    "Provider reported error: {}",
                    failure.message
                );
            }
            WebhookEvent::Unsupported { field, detail } => {
                tracing::debug!(%field, %detail, "Ignoring unsupported webhook change");
            }
        }
        Ok(())
    }

    /// Stores one inbound message and notifies its owner.
    ///
    /// Returns `None` when the message was dropped: unknown account, blocked
    /// sender, or a redelivery of a message already stored.
    pub async fn receive_message(&self, inbound: InboundMessage) -> Result<Option<Message>> {
        let Some(account) = self
            .db
            .find_account_by_phone_number_id(&inbound.phone_number_id)
            .await?
        else {
            tracing::warn!(phone_number_id = %inbound.phone_number_id, "Inbound message for unknown account");
            return Ok(None);
        };

        let from = normalize_phone(&inbound.from);
        if account.is_blocked(&from) {
            tracing::debug!(account_id = %account.id, from = %from, "Dropping message from blocked number");
            return Ok(None);
        }

        if let Some(name) = &inbound.profile_name {
            self.remember_profile(&account.user_id, &from, name).await;
        }

        let chat = ChatResolver::new(&self.db, &account.user_id, &account.id)
            .resolve(&from)
            .await?;

        let stored = self
            .db
            .create_inbound(NewInboundMessage {
                user_id: account.user_id.clone(),
                account_id: account.id.clone(),
                chat_id: chat.id.clone(),
                from_number: from.clone(),
                to_number: inbound
                    .display_phone_number
                    .clone()
                    .or_else(|| account.display_phone_number.clone())
                    .unwrap_or_else(|| account.phone_number_id.clone()),
                body: inbound.body.clone(),
                media_id: inbound.media_id.clone(),
                filename: inbound.filename.clone(),
                kind: inbound.kind,
                provider_message_id: inbound.provider_message_id.clone(),
                participants: chat.participants.0.clone(),
                context_message_id: inbound.context_message_id.clone(),
                timestamp: inbound.timestamp,
            })
            .await?;

        let Some(message) = stored else {
            return Ok(None);
        };

        let preview = inbound
            .body
            .clone()
            .unwrap_or_else(|| format!("[{}]", inbound.kind.as_str()));
        let viewing = self.presence.is_open(&account.user_id, &chat.id);
        let chat = self
            .db
            .touch_chat(&chat.id, Some(&preview), message.created_at, !viewing)
            .await?;

        tracing::info!(
            account_id = %account.id,
            chat_id = %chat.id,
            message_id = %message.id,
            kind = inbound.kind.as_str(),
            "Inbound message stored"
        );

        self.publish(
            &account.user_id,
            PushEvent::NewMessage {
                chat: Some(chat.clone()),
                message: Some(message.clone()),
            },
        );

        if account.ai_active && inbound.kind == MessageKind::Text {
            if let Some(text) = inbound.body.as_deref() {
                self.auto_reply(&account, &chat, &from, text).await;
            }
        }

        Ok(Some(message))
    }

    /// Saves the sender's WhatsApp profile name unless the contact already has one.
    async fn remember_profile(&self, user_id: &str, number: &str, name: &str) {
        let known = match self.db.get_contact_by_phone(user_id, number).await {
            Ok(contact) => contact.and_then(|c| c.name).is_some(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Contact lookup failed");
                return;
            }
        };
        if known {
            return;
        }

        let input = ContactInput {
            phone_number: number.to_string(),
            name: Some(name.to_string()),
            ..Default::default()
        };
        if let Err(e) = self.db.upsert_contact(user_id, &input).await {
            tracing::warn!(user_id, error = %e, "Could not save profile name");
        }
    }

    async fn auto_reply(&self, account: &Account, chat: &Chat, from: &str, text: &str) {
        let Some(url) = account.ai_webhook_url.clone() else {
            return;
        };

        let request = AutoReplyRequest {
            url,
            prompt: account.ai_prompt.clone(),
            message: text.to_string(),
            from: from.to_string(),
            chat_id: chat.id.clone(),
        };

        let reply = match self.auto_reply.reply(&request).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(account_id = %account.id, chat_id = %chat.id, error = %e, "Auto-reply hook failed");
                return;
            }
        };

        if let Err(e) = self.send_auto_reply(account, chat, reply).await {
            tracing::warn!(account_id = %account.id, chat_id = %chat.id, error = %e, "Auto-reply not sent");
        }
    }
}
