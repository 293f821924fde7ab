use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use wabiz_core::phone::{is_valid_phone, normalize_phone};
use wabiz_core::template::{TemplateDefinition, TemplateValues, build_template_payload, render_body};
use wabiz_core::{MessageKind, Participant, tags};
use wabiz_db::{Account, Chat, Message, NewOutboundMessage, OutboundState};
use wabiz_graph::{Credentials, MediaSource, OutboundBody, OutboundRequest};

use crate::error::{Result, WorkerError};
use crate::events::PushEvent;
use crate::resolver::ChatResolver;
use crate::worker::WabizWorker;

const MAX_TEXT_LEN: usize = 4096;

/// Content of an outbound message as callers describe it.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outgoing {
    Text {
        body: String,
        #[serde(default)]
        preview_url: bool,
    },
    Media {
        kind: MessageKind,
        #[serde(default)]
        media_id: Option<String>,
        #[serde(default)]
        link: Option<String>,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        filename: Option<String>,
    },
    Template {
        template: TemplateDefinition,
        #[serde(default)]
        values: TemplateValues,
    },
}

/// Who a single send goes to: an existing chat, or a phone number.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendTarget {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    /// Local id of the message being replied to.
    #[serde(default)]
    pub reply_to: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BroadcastTarget {
    #[serde(default)]
    pub account_id: Option<String>,
    /// Existing broadcast chat; when absent one is created from `numbers`.
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub numbers: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub chat: Chat,
    pub message: Message,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientResult {
    pub number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub chat: Chat,
    pub message: Message,
    pub sent: usize,
    pub failed: usize,
    pub results: Vec<RecipientResult>,
}

/// An outbound message ready for the provider, plus what gets stored.
struct Prepared {
    request: OutboundRequest,
    body: Option<String>,
    media_id: Option<String>,
    media_url: Option<String>,
    filename: Option<String>,
    preview: String,
}

fn prepare(to: &str, outgoing: &Outgoing, reply_to: Option<String>) -> Result<Prepared> {
    let prepared = match outgoing {
        Outgoing::Text { body, preview_url } => {
            let body = body.trim();
            if body.is_empty() {
                return Err(WorkerError::Validation("Message body is required".into()));
            }
            if body.chars().count() > MAX_TEXT_LEN {
                return Err(WorkerError::Validation(format!(
                    "Message body exceeds {MAX_TEXT_LEN} characters"
                )));
            }
            Prepared {
                request: OutboundRequest {
                    to: to.to_string(),
                    body: OutboundBody::Text {
                        body: body.to_string(),
                        preview_url: *preview_url,
                    },
                    reply_to,
                },
                body: Some(body.to_string()),
                media_id: None,
                media_url: None,
                filename: None,
                preview: body.to_string(),
            }
        }
        Outgoing::Media {
            kind,
            media_id,
            link,
            caption,
            filename,
        } => {
            if !kind.is_media() {
                return Err(WorkerError::Validation(format!("{} is not a media type", kind.as_str())));
            }
            let source = match (media_id, link) {
                (Some(id), None) => MediaSource::Id(id.clone()),
                (None, Some(link)) => MediaSource::Link(link.clone()),
                _ => {
                    return Err(WorkerError::Validation(
                        "Exactly one of media_id or link is required".into(),
                    ));
                }
            };
            Prepared {
                request: OutboundRequest {
                    to: to.to_string(),
                    body: OutboundBody::Media {
                        kind: *kind,
                        source,
                        caption: caption.clone(),
                        filename: filename.clone(),
                    },
                    reply_to,
                },
                body: caption.clone(),
                media_id: media_id.clone(),
                media_url: link.clone(),
                filename: filename.clone(),
                preview: caption.clone().unwrap_or_else(|| format!("[{}]", kind.as_str())),
            }
        }
        Outgoing::Template { template, values } => {
            let payload = build_template_payload(template, values)?;
            let rendered = render_body(template, values);
            Prepared {
                request: OutboundRequest {
                    to: to.to_string(),
                    body: OutboundBody::Template(payload),
                    reply_to,
                },
                body: Some(rendered.clone()),
                media_id: None,
                media_url: None,
                filename: None,
                preview: rendered,
            }
        }
    };
    Ok(prepared)
}

fn check_recipient(account: &Account, number: &str) -> Result<()> {
    if !is_valid_phone(number) {
        return Err(WorkerError::Validation(format!("Invalid phone number: {number}")));
    }
    if account.is_blocked(number) {
        return Err(WorkerError::Validation(format!("{number} is blocked on this account")));
    }
    Ok(())
}

impl WabizWorker {
    /// Sends one message to a single chat.
    ///
    /// Validation and the credit check happen before the provider is called. A
    /// provider failure is stored on the message and returned as the error.
    pub async fn send(&self, user_id: &str, target: SendTarget, outgoing: Outgoing) -> Result<SendOutcome> {
        let (account, chat) = match (&target.chat_id, &target.to) {
            (Some(chat_id), _) => {
                let chat = self.db.get_chat(user_id, chat_id).await?;
                let account = self.sending_account(user_id, Some(&chat.account_id)).await?;
                (account, chat)
            }
            (None, Some(to)) => {
                let account = self.sending_account(user_id, target.account_id.as_deref()).await?;
                check_recipient(&account, to)?;
                let chat = ChatResolver::new(&self.db, user_id, &account.id).resolve(to).await?;
                (account, chat)
            }
            (None, None) => {
                return Err(WorkerError::Validation("Either chat_id or to is required".into()));
            }
        };

        if chat.is_broadcast() {
            return Err(WorkerError::Validation(
                "Broadcast chats are sent through the broadcast endpoint".into(),
            ));
        }
        let to = chat
            .primary_number
            .clone()
            .ok_or(WorkerError::NotFound("Chat recipient"))?;
        check_recipient(&account, &to)?;

        let reply_to = match &target.reply_to {
            Some(id) => {
                let quoted = self.db.get_message(user_id, id).await?;
                if quoted.chat_id != chat.id {
                    return Err(WorkerError::Validation(
                        "Replied message belongs to another chat".into(),
                    ));
                }
                Some(quoted.provider_message_id.ok_or_else(|| {
                    WorkerError::Validation("Replied message was never delivered".into())
                })?)
            }
            None => None,
        };

        let prepared = prepare(&to, &outgoing, reply_to)?;
        let creds = self.credentials(&account)?;
        self.deliver(&account, &chat, &creds, prepared, None).await
    }

    /// Sends a text as a reply generated by the auto-reply hook.
    pub(crate) async fn send_auto_reply(&self, account: &Account, chat: &Chat, text: String) -> Result<SendOutcome> {
        let to = chat
            .primary_number
            .clone()
            .ok_or(WorkerError::NotFound("Chat recipient"))?;
        let outgoing = Outgoing::Text {
            body: text,
            preview_url: false,
        };
        let prepared = prepare(&to, &outgoing, None)?;
        let creds = self.credentials(account)?;
        self.deliver(account, chat, &creds, prepared, Some(tags::AI_CHAT)).await
    }

    async fn deliver(
        &self,
        account: &Account,
        chat: &Chat,
        creds: &Credentials,
        prepared: Prepared,
        tag: Option<&str>,
    ) -> Result<SendOutcome> {
        let cost = self.settings.message_cost;
        if cost > 0 {
            self.db.debit(&account.user_id, cost).await?;
        }

        let result = self.provider.send_message(creds, &prepared.request).await;

        let state = match &result {
            Ok(sent) => OutboundState::Sent {
                provider_message_id: Some(sent.provider_message_id.clone()),
            },
            Err(e) => OutboundState::Failed { error: e.to_string() },
        };

        if result.is_err() && cost > 0 {
            if let Err(e) = self.db.credit(&account.user_id, cost).await {
                tracing::error!(user_id = %account.user_id, error = %e, "Refund after failed send did not apply");
            }
        }

        let new_message = NewOutboundMessage {
            user_id: account.user_id.clone(),
            account_id: account.id.clone(),
            chat_id: chat.id.clone(),
            from_number: account
                .display_phone_number
                .clone()
                .unwrap_or_else(|| account.phone_number_id.clone()),
            to_number: prepared.request.to.clone(),
            body: prepared.body,
            media_id: prepared.media_id,
            media_url: prepared.media_url,
            filename: prepared.filename,
            kind: prepared.request.kind(),
            tag: tag.map(str::to_string),
            participants: chat.participants.0.clone(),
            context_message_id: prepared.request.reply_to.clone(),
            state,
        };

        let stored = match self.db.create_outbound(new_message.clone()).await {
            Err(e) if result.is_ok() => {
                tracing::warn!(chat_id = %chat.id, error = %e, "Storing sent message failed, retrying once");
                self.db.create_outbound(new_message).await
            }
            other => other,
        };
        let message = match stored {
            Ok(message) => message,
            Err(e) => {
                return Err(match result {
                    Ok(sent) => {
                        tracing::error!(
                            chat_id = %chat.id,
                            provider_message_id = %sent.provider_message_id,
                            error = %e,
                            "Message sent but not recorded"
                        );
                        WorkerError::Unrecorded {
                            provider_message_id: sent.provider_message_id,
                            source: e,
                        }
                    }
                    Err(provider) => {
                        tracing::error!(chat_id = %chat.id, error = %e, "Failed send could not be recorded");
                        provider.into()
                    }
                });
            }
        };

        if let Err(err) = result {
            tracing::warn!(
                chat_id = %chat.id,
                message_id = %message.id,
                error = %err,
                "Provider rejected message"
            );
            self.publish(
                &account.user_id,
                PushEvent::NewMessage {
                    chat: None,
                    message: Some(message),
                },
            );
            return Err(err.into());
        }

        let chat = match self
            .db
            .touch_chat(&chat.id, Some(&prepared.preview), message.created_at, false)
            .await
        {
            Ok(chat) => chat,
            Err(e) => {
                tracing::warn!(chat_id = %chat.id, error = %e, "Chat preview not updated");
                chat.clone()
            }
        };

        tracing::info!(
            chat_id = %chat.id,
            message_id = %message.id,
            provider_message_id = message.provider_message_id.as_deref().unwrap_or_default(),
            "Message sent"
        );

        self.publish(
            &account.user_id,
            PushEvent::NewMessage {
                chat: Some(chat.clone()),
                message: Some(message.clone()),
            },
        );
        Ok(SendOutcome { chat, message })
    }

    /// Creates a named broadcast list without sending anything.
    pub async fn create_broadcast(
        &self,
        user_id: &str,
        account_id: Option<&str>,
        name: Option<&str>,
        numbers: &[String],
    ) -> Result<Chat> {
        let account = self.sending_account(user_id, account_id).await?;
        if let Some(bad) = numbers.iter().find(|n| !is_valid_phone(n)) {
            return Err(WorkerError::Validation(format!("Invalid phone number: {bad}")));
        }
        let participants = unique_numbers(numbers.iter().map(String::as_str))
            .into_iter()
            .map(|n| Participant::new(&n))
            .collect::<Vec<_>>();
        if participants.is_empty() {
            return Err(WorkerError::Validation("At least one number is required".into()));
        }

        let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or("Broadcast");
        Ok(self
            .db
            .create_broadcast_chat(user_id, &account.id, name, participants)
            .await?)
    }

    /// Sends the same content to every recipient of a broadcast, each on its own
    /// single chat, and records one summary message on the broadcast chat.
    pub async fn send_broadcast(
        &self,
        user_id: &str,
        target: BroadcastTarget,
        outgoing: Outgoing,
    ) -> Result<BroadcastReport> {
        let (account, chat) = match &target.chat_id {
            Some(chat_id) => {
                let chat = self.db.get_chat(user_id, chat_id).await?;
                if !chat.is_broadcast() {
                    return Err(WorkerError::Validation(format!("Chat {chat_id} is not a broadcast")));
                }
                let account = self.sending_account(user_id, Some(&chat.account_id)).await?;
                (account, chat)
            }
            None => {
                let chat = self
                    .create_broadcast(
                        user_id,
                        target.account_id.as_deref(),
                        target.name.as_deref(),
                        &target.numbers,
                    )
                    .await?;
                let account = self.sending_account(user_id, Some(&chat.account_id)).await?;
                (account, chat)
            }
        };

        let numbers = unique_numbers(chat.participants.iter().map(|p| p.number.as_str()));
        if numbers.is_empty() {
            return Err(WorkerError::Validation("Broadcast has no recipients".into()));
        }

        // fail on malformed templates before anything is sent
        let summary = prepare(&numbers[0], &outgoing, None)?;
        let creds = self.credentials(&account)?;
        let mut resolver = ChatResolver::new(&self.db, user_id, &account.id);
        let mut results = Vec::with_capacity(numbers.len());

        for number in &numbers {
            match self.deliver_one(&account, &creds, &mut resolver, number, &outgoing).await {
                Ok(outcome) => results.push(RecipientResult {
                    number: number.clone(),
                    chat_id: Some(outcome.chat.id),
                    message_id: Some(outcome.message.id),
                    error: None,
                }),
                Err(e) => {
                    tracing::warn!(broadcast_id = %chat.id, number = %number, error = %e, "Broadcast recipient failed");
                    results.push(RecipientResult {
                        number: number.clone(),
                        chat_id: None,
                        message_id: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let sent = results.iter().filter(|r| r.error.is_none()).count();
        let failed = results.len() - sent;
        let state = if sent > 0 {
            OutboundState::Sent {
                provider_message_id: None,
            }
        } else {
            OutboundState::Failed {
                error: results
                    .iter()
                    .find_map(|r| r.error.clone())
                    .unwrap_or_else(|| "No recipient accepted the message".into()),
            }
        };

        let message = self
            .db
            .create_outbound(NewOutboundMessage {
                user_id: user_id.to_string(),
                account_id: account.id.clone(),
                chat_id: chat.id.clone(),
                from_number: account
                    .display_phone_number
                    .clone()
                    .unwrap_or_else(|| account.phone_number_id.clone()),
                to_number: numbers.join(","),
                body: summary.body,
                media_id: summary.media_id,
                media_url: summary.media_url,
                filename: summary.filename,
                kind: summary.request.kind(),
                tag: Some(tags::BROADCAST.to_string()),
                participants: chat.participants.0.clone(),
                context_message_id: None,
                state,
            })
            .await?;

        let chat = self
            .db
            .touch_chat(&chat.id, Some(&summary.preview), message.created_at, false)
            .await?;

        tracing::info!(broadcast_id = %chat.id, sent, failed, "Broadcast finished");
        self.publish(
            user_id,
            PushEvent::NewMessage {
                chat: Some(chat.clone()),
                message: Some(message.clone()),
            },
        );

        Ok(BroadcastReport {
            chat,
            message,
            sent,
            failed,
            results,
        })
    }

    async fn deliver_one(
        &self,
        account: &Account,
        creds: &Credentials,
        resolver: &mut ChatResolver<'_>,
        number: &str,
        outgoing: &Outgoing,
    ) -> Result<SendOutcome> {
        check_recipient(account, number)?;
        let chat = resolver.resolve(number).await?;
        let prepared = prepare(number, outgoing, None)?;
        self.deliver(account, &chat, creds, prepared, Some(tags::BROADCAST)).await
    }
}

/// Normalized numbers in first-seen order, without repeats.
fn unique_numbers<'a>(numbers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    numbers
        .map(normalize_phone)
        .filter(|n| !n.is_empty() && seen.insert(n.clone()))
        .collect()
}
