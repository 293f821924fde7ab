use std::sync::Arc;

use wabiz_core::{PageRequest, Paged};
use wabiz_db::{ApiToken, Chat, Contact, ContactInput, FieldCipher, Message, WabizDb};
use wabiz_graph::{AutoReplyHook, MessagingProvider};

use crate::error::Result;
use crate::events::PushEvent;
use crate::notify::Notifier;
use crate::presence::Presence;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Credits taken per delivered outbound message. Zero disables billing.
    pub message_cost: i64,
    /// Shared secret of the payment provider's callback signature.
    pub payment_secret: Option<String>,
    /// Minimum gap between two verification-code requests for one account.
    pub code_cooldown_secs: i64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            message_cost: 0,
            payment_secret: None,
            code_cooldown_secs: 60,
        }
    }
}

/// Orchestrates storage, the messaging provider and real-time fanout.
///
/// Cheap to clone; every request handler holds its own copy.
#[derive(Clone)]
pub struct WabizWorker {
    pub(crate) db: Arc<WabizDb>,
    pub(crate) provider: Arc<dyn MessagingProvider>,
    pub(crate) auto_reply: Arc<dyn AutoReplyHook>,
    pub(crate) cipher: FieldCipher,
    pub(crate) notifier: Notifier,
    pub(crate) presence: Presence,
    pub(crate) settings: Arc<WorkerSettings>,
}

impl WabizWorker {
    pub fn new(
        db: WabizDb,
        provider: Arc<dyn MessagingProvider>,
        auto_reply: Arc<dyn AutoReplyHook>,
        cipher: FieldCipher,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            db: Arc::new(db),
            provider,
            auto_reply,
            cipher,
            notifier: Notifier::new(),
            presence: Presence::new(),
            settings: Arc::new(settings),
        }
    }

    pub fn db(&self) -> &WabizDb {
        &self.db
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub(crate) fn publish(&self, user_id: &str, event: PushEvent) {
        let delivered = self.notifier.publish(user_id, event);
        tracing::trace!(user_id, delivered, "Event published");
    }

    pub async fn list_chats(
        &self,
        user_id: &str,
        account_id: Option<&str>,
        page: PageRequest,
    ) -> Result<Paged<Chat>> {
        Ok(self.db.list_chats(user_id, account_id, page).await?)
    }

    pub async fn list_messages(&self, user_id: &str, chat_id: &str, page: PageRequest) -> Result<Paged<Message>> {
        Ok(self.db.list_messages(user_id, chat_id, page).await?)
    }

    pub async fn mark_chat_read(&self, user_id: &str, chat_id: &str) -> Result<Chat> {
        Ok(self.db.mark_chat_read(user_id, chat_id).await?)
    }

    pub async fn set_favourite(&self, user_id: &str, chat_id: &str, favourite: bool) -> Result<Chat> {
        Ok(self.db.set_favourite(user_id, chat_id, favourite).await?)
    }

    /// Marks a chat as being viewed; inbound messages stop raising its unread count.
    pub async fn open_chat(&self, user_id: &str, chat_id: &str) -> Result<Chat> {
        let chat = self.db.mark_chat_read(user_id, chat_id).await?;
        self.presence.open(user_id, &chat.id);
        Ok(chat)
    }

    pub fn close_chat(&self, user_id: &str, chat_id: &str) {
        self.presence.close(user_id, chat_id);
    }

    pub async fn delete_chats(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        Ok(self.db.delete_chats(user_id, ids).await?)
    }

    pub async fn delete_messages(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        Ok(self.db.delete_messages(user_id, ids).await?)
    }

    pub async fn upsert_contact(&self, user_id: &str, input: &ContactInput) -> Result<Contact> {
        if !wabiz_core::phone::is_valid_phone(&input.phone_number) {
            return Err(crate::WorkerError::Validation(format!(
                "Invalid phone number: {}",
                input.phone_number
            )));
        }
        Ok(self.db.upsert_contact(user_id, input).await?)
    }

    pub async fn list_contacts(&self, user_id: &str, page: PageRequest) -> Result<Paged<Contact>> {
        Ok(self.db.list_contacts(user_id, page).await?)
    }

    pub async fn delete_contacts(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        Ok(self.db.delete_contacts(user_id, ids).await?)
    }

    pub async fn create_api_token(&self, user_id: &str, name: &str) -> Result<(ApiToken, String)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(crate::WorkerError::Validation("Token name is required".into()));
        }
        Ok(self.db.create_api_token(user_id, name).await?)
    }

    pub async fn authenticate(&self, token: &str) -> Result<Option<String>> {
        Ok(self.db.authenticate_token(token).await?.map(|t| t.user_id))
    }

    pub async fn list_api_tokens(&self, user_id: &str) -> Result<Vec<ApiToken>> {
        Ok(self.db.list_api_tokens(user_id).await?)
    }

    pub async fn revoke_api_token(&self, user_id: &str, id: &str) -> Result<()> {
        Ok(self.db.revoke_api_token(user_id, id).await?)
    }
}
