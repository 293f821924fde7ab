use std::collections::HashMap;

use wabiz_core::Participant;
use wabiz_core::phone::normalize_phone;
use wabiz_db::{Chat, WabizDb};

use crate::error::Result;

/// Finds or creates the single chat for a phone number.
///
/// Holds a memo keyed by normalized number, so it is built per operation
/// (one inbound message, one broadcast) and dropped afterwards.
pub struct ChatResolver<'a> {
    db: &'a WabizDb,
    user_id: &'a str,
    account_id: &'a str,
    memo: HashMap<String, Chat>,
}

impl<'a> ChatResolver<'a> {
    pub fn new(db: &'a WabizDb, user_id: &'a str, account_id: &'a str) -> Self {
        Self {
            db,
            user_id,
            account_id,
            memo: HashMap::new(),
        }
    }

    pub async fn resolve(&mut self, phone: &str) -> Result<Chat> {
        let number = normalize_phone(phone);
        if let Some(chat) = self.memo.get(&number) {
            return Ok(chat.clone());
        }

        let chat = match self.db.find_single_chat(self.user_id, self.account_id, &number).await? {
            Some(chat) => chat,
            None => {
                self.db
                    .create_single_chat(self.user_id, self.account_id, Participant::new(&number))
                    .await?
            }
        };

        let chat = self.enrich(chat, &number).await;
        self.memo.insert(number, chat.clone());
        Ok(chat)
    }

    /// Fills the participant's name and picture from the address book.
    async fn enrich(&self, mut chat: Chat, number: &str) -> Chat {
        let contact = match self.db.get_contact_by_phone(self.user_id, number).await {
            Ok(Some(contact)) => contact,
            Ok(None) => return chat,
            Err(e) => {
                tracing::warn!(chat_id = %chat.id, error = %e, "Contact lookup failed, using bare chat");
                return chat;
            }
        };

        for participant in chat.participants.iter_mut().filter(|p| p.number == number) {
            if contact.name.is_some() {
                participant.name = contact.name.clone();
            }
            if contact.image_url.is_some() {
                participant.image = contact.image_url.clone();
            }
        }
        chat
    }
}

#[cfg(test)]
mod tests {
    use wabiz_db::ContactInput;

    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn resolves_same_chat_for_formatted_numbers() {
        let h = harness().await;
        let mut resolver = ChatResolver::new(h.worker.db(), "u1", &h.account.id);

        let a = resolver.resolve("+1 555 000 2222").await.unwrap();
        let b = resolver.resolve("15550002222").await.unwrap();
        assert_eq!(a.id, b.id);

        let mut fresh = ChatResolver::new(h.worker.db(), "u1", &h.account.id);
        assert_eq!(fresh.resolve("1-555-000-2222").await.unwrap().id, a.id);
    }

    #[tokio::test]
    async fn enriches_from_contacts() {
        let h = harness().await;
        h.worker
            .db()
            .upsert_contact(
                "u1",
                &ContactInput {
                    phone_number: "15550002222".into(),
                    name: Some("Dana".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut resolver = ChatResolver::new(h.worker.db(), "u1", &h.account.id);
        let chat = resolver.resolve("15550002222").await.unwrap();
        assert_eq!(chat.participants[0].name.as_deref(), Some("Dana"));
    }
}
