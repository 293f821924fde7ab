use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use wabiz_core::{MessageStatus, PageRequest, Paged, STATUS_PRIORITY_SQL, priority};

use crate::error::{DbError, Result};
use crate::models::{Message, NewInboundMessage, NewOutboundMessage, OutboundState, StatusOutcome};
use crate::repository::{WabizDb, chrono_timestamp};

impl WabizDb {
    /// Records an outbound message once the provider call has returned.
    pub async fn create_outbound(&self, new: NewOutboundMessage) -> Result<Message> {
        let now = chrono_timestamp();
        let (status, provider_id, error, sent_at, failed_at) = match &new.state {
            OutboundState::Sent { provider_message_id } => {
                (MessageStatus::Sent, provider_message_id.clone(), None, Some(now), None)
            }
            OutboundState::Failed { error } => {
                (MessageStatus::Failed, None, Some(error.clone()), None, Some(now))
            }
        };

        let message = sqlx::query_as::<_, Message>(
            r#"INSERT INTO messages
               (id, user_id, account_id, chat_id, direction, from_number, to_number, body,
                media_id, media_url, filename, kind, tag, status, provider_message_id,
                participants, context_message_id, context_body, sent_at, failed_at,
                error_message, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, 'outbound', ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16,
                       (SELECT body FROM messages WHERE chat_id = ?4 AND provider_message_id = ?16),
                       ?17, ?18, ?19, ?20, ?20)
               RETURNING *"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&new.user_id)
        .bind(&new.account_id)
        .bind(&new.chat_id)
        .bind(&new.from_number)
        .bind(&new.to_number)
        .bind(&new.body)
        .bind(&new.media_id)
        .bind(&new.media_url)
        .bind(&new.filename)
        .bind(new.kind.as_str())
        .bind(&new.tag)
        .bind(status.as_str())
        .bind(&provider_id)
        .bind(Json(&new.participants))
        .bind(&new.context_message_id)
        .bind(sent_at)
        .bind(failed_at)
        .bind(&error)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            message_id = %message.id,
            chat_id = %message.chat_id,
            status = %message.status,
            "Outbound message stored"
        );
        Ok(message)
    }

    /// Stores an inbound message. Returns `None` when the provider id was already
    /// recorded for this account, which makes webhook redelivery a no-op.
    pub async fn create_inbound(&self, new: NewInboundMessage) -> Result<Option<Message>> {
        let now = chrono_timestamp();

        let message = sqlx::query_as::<_, Message>(
            r#"INSERT OR IGNORE INTO messages
               (id, user_id, account_id, chat_id, direction, from_number, to_number, body,
                media_id, filename, kind, status, provider_message_id, participants,
                context_message_id, context_body, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, 'inbound', ?5, ?6, ?7, ?8, ?9, ?10, 'received', ?11, ?12,
                       ?13,
                       (SELECT body FROM messages WHERE chat_id = ?4 AND provider_message_id = ?13),
                       ?14, ?15)
               RETURNING *"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&new.user_id)
        .bind(&new.account_id)
        .bind(&new.chat_id)
        .bind(&new.from_number)
        .bind(&new.to_number)
        .bind(&new.body)
        .bind(&new.media_id)
        .bind(&new.filename)
        .bind(new.kind.as_str())
        .bind(&new.provider_message_id)
        .bind(Json(&new.participants))
        .bind(&new.context_message_id)
        .bind(new.timestamp)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if message.is_none() {
            tracing::debug!(
                provider_message_id = %new.provider_message_id,
                "Inbound message already stored"
            );
        }
        Ok(message)
    }

    /// Moves a message forward along the success path.
    ///
    /// One conditional update: the row changes only when its current status is not
    /// `failed` and either ranks below `status` or equals it. The first timestamp
    /// observed for a status is kept.
    pub async fn apply_status(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
        timestamp: i64,
    ) -> Result<StatusOutcome> {
        let Some(rank) = priority(status) else {
            return self.mark_failed(provider_message_id, timestamp, None).await;
        };

        let stamp = status
            .timestamp_column()
            .map(|col| format!("{col} = COALESCE({col}, ?2),"))
            .unwrap_or_default();
        let sql = format!(
            r#"UPDATE messages SET status = ?1, {stamp} updated_at = ?3
               WHERE provider_message_id = ?4 AND status <> 'failed'
                 AND ({STATUS_PRIORITY_SQL} < ?5 OR status = ?1)
               RETURNING *"#
        );

        let mut updated = sqlx::query_as::<_, Message>(&sql)
            .bind(status.as_str())
            .bind(timestamp)
            .bind(chrono_timestamp())
            .bind(provider_message_id)
            .bind(i64::from(rank))
            .fetch_all(&self.pool)
            .await?;

        match updated.pop() {
            Some(message) => Ok(StatusOutcome::Applied(message)),
            None => self.missed_status(provider_message_id).await,
        }
    }

    /// Overrides any non-failed status with `failed`.
    pub async fn mark_failed(
        &self,
        provider_message_id: &str,
        timestamp: i64,
        error: Option<&str>,
    ) -> Result<StatusOutcome> {
        let mut updated = sqlx::query_as::<_, Message>(
            r#"UPDATE messages SET
                 status = 'failed',
                 failed_at = COALESCE(failed_at, ?),
                 error_message = COALESCE(?, error_message),
                 updated_at = ?
               WHERE provider_message_id = ? AND status <> 'failed'
               RETURNING *"#,
        )
        .bind(timestamp)
        .bind(error)
        .bind(chrono_timestamp())
        .bind(provider_message_id)
        .fetch_all(&self.pool)
        .await?;

        match updated.pop() {
            Some(message) => Ok(StatusOutcome::Applied(message)),
            None => self.missed_status(provider_message_id).await,
        }
    }

    async fn missed_status(&self, provider_message_id: &str) -> Result<StatusOutcome> {
        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM messages WHERE provider_message_id = ? LIMIT 1")
                .bind(provider_message_id)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Ok(StatusOutcome::Unknown),
            Some((status,)) => {
                let current = status
                    .parse::<MessageStatus>()
                    .map_err(|e| DbError::Sqlx(sqlx::Error::Decode(Box::new(e))))?;
                Ok(StatusOutcome::Stale { current })
            }
        }
    }

    pub async fn get_message(&self, user_id: &str, id: &str) -> Result<Message> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound("Message"))
    }

    pub async fn find_message_by_provider_id(
        &self,
        account_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<Message>> {
        Ok(sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE account_id = ? AND provider_message_id = ?",
        )
        .bind(account_id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Newest first.
    pub async fn list_messages(
        &self,
        user_id: &str,
        chat_id: &str,
        page: PageRequest,
    ) -> Result<Paged<Message>> {
        // ownership check doubles as the not-found path
        self.get_chat(user_id, chat_id).await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE chat_id = ? AND user_id = ?")
                .bind(chat_id)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        let messages = sqlx::query_as::<_, Message>(
            r#"SELECT * FROM messages WHERE chat_id = ? AND user_id = ?
               ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"#,
        )
        .bind(chat_id)
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paged::new(messages, page, total))
    }

    pub async fn delete_messages(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM messages WHERE user_id = ");
        query.push_bind(user_id);
        query.push(" AND id IN (");
        let mut list = query.separated(", ");
        for id in ids {
            list.push_bind(id.as_str());
        }
        list.push_unseparated(")");

        Ok(query.build().execute(&self.pool).await?.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use wabiz_core::{MessageKind, Participant};

    use super::*;
    use crate::models::Chat;
    use crate::repository::test_support::*;

    use MessageStatus::*;

    async fn setup() -> (WabizDb, tempfile::TempDir, Chat) {
        let (db, dir) = temp_db().await;
        let account = db.create_account(new_account("u1", "pn-1")).await.unwrap();
        let chat = db
            .create_single_chat("u1", &account.id, Participant::new("15550002222"))
            .await
            .unwrap();
        (db, dir, chat)
    }

    fn outbound(chat: &Chat, state: OutboundState) -> NewOutboundMessage {
        NewOutboundMessage {
            user_id: chat.user_id.clone(),
            account_id: chat.account_id.clone(),
            chat_id: chat.id.clone(),
            from_number: "15550001111".into(),
            to_number: "15550002222".into(),
            body: Some("hello".into()),
            media_id: None,
            media_url: None,
            filename: None,
            kind: MessageKind::Text,
            tag: None,
            participants: chat.participants.0.clone(),
            context_message_id: None,
            state,
        }
    }

    fn sent(id: &str) -> OutboundState {
        OutboundState::Sent {
            provider_message_id: Some(id.into()),
        }
    }

    fn inbound(chat: &Chat, provider_id: &str, context: Option<&str>) -> NewInboundMessage {
        NewInboundMessage {
            user_id: chat.user_id.clone(),
            account_id: chat.account_id.clone(),
            chat_id: chat.id.clone(),
            from_number: "15550002222".into(),
            to_number: "15550001111".into(),
            body: Some("reply".into()),
            media_id: None,
            filename: None,
            kind: MessageKind::Text,
            provider_message_id: provider_id.into(),
            participants: chat.participants.0.clone(),
            context_message_id: context.map(Into::into),
            timestamp: 1_700_000_000,
        }
    }

    fn permutations(items: &[MessageStatus]) -> Vec<Vec<MessageStatus>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                out.push(tail);
            }
        }
        out
    }

    #[tokio::test]
    async fn read_before_delivered_keeps_read() {
        let (db, _dir, chat) = setup().await;
        db.create_outbound(outbound(&chat, sent("wamid.A"))).await.unwrap();

        let outcome = db.apply_status("wamid.A", Read, 1002).await.unwrap();
        assert!(matches!(outcome, StatusOutcome::Applied(ref m) if m.status == Read));

        let outcome = db.apply_status("wamid.A", Delivered, 1001).await.unwrap();
        assert!(matches!(outcome, StatusOutcome::Stale { current: Read }));

        let stored = db.find_message_by_provider_id(&chat.account_id, "wamid.A").await.unwrap().unwrap();
        assert_eq!(stored.status, Read);
        assert_eq!(stored.read_at, Some(1002));
        assert_eq!(stored.delivered_at, None);
    }

    #[tokio::test]
    async fn final_status_is_the_highest_seen_in_any_order() {
        let (db, _dir, chat) = setup().await;

        for (n, order) in permutations(&[Sent, Delivered, Read]).into_iter().enumerate() {
            let id = format!("wamid.P{n}");
            db.create_outbound(outbound(&chat, sent(&id))).await.unwrap();
            for status in order {
                db.apply_status(&id, status, 1000).await.unwrap();
            }
            let stored = db.find_message_by_provider_id(&chat.account_id, &id).await.unwrap().unwrap();
            assert_eq!(stored.status, Read, "order #{n}");
        }

        for (n, order) in permutations(&[Sent, Delivered]).into_iter().enumerate() {
            let id = format!("wamid.Q{n}");
            db.create_outbound(outbound(&chat, sent(&id))).await.unwrap();
            for status in order {
                db.apply_status(&id, status, 1000).await.unwrap();
            }
            let stored = db.find_message_by_provider_id(&chat.account_id, &id).await.unwrap().unwrap();
            assert_eq!(stored.status, Delivered, "order #{n}");
        }
    }

    #[tokio::test]
    async fn duplicate_status_keeps_first_timestamp() {
        let (db, _dir, chat) = setup().await;
        db.create_outbound(outbound(&chat, sent("wamid.D"))).await.unwrap();

        db.apply_status("wamid.D", Delivered, 10).await.unwrap();
        let outcome = db.apply_status("wamid.D", Delivered, 20).await.unwrap();
        let StatusOutcome::Applied(message) = outcome else {
            panic!("duplicate should re-apply");
        };
        assert_eq!(message.delivered_at, Some(10));
    }

    #[tokio::test]
    async fn same_rank_does_not_relabel_direction() {
        let (db, _dir, chat) = setup().await;
        db.create_inbound(inbound(&chat, "wamid.R", None)).await.unwrap();

        let outcome = db.apply_status("wamid.R", Pending, 10).await.unwrap();
        assert!(matches!(outcome, StatusOutcome::Stale { current: Received }));

        let stored = db.find_message_by_provider_id(&chat.account_id, "wamid.R").await.unwrap().unwrap();
        assert_eq!(stored.status, Received);
    }

    #[tokio::test]
    async fn failed_is_absorbing() {
        let (db, _dir, chat) = setup().await;
        db.create_outbound(outbound(&chat, sent("wamid.F"))).await.unwrap();
        db.apply_status("wamid.F", Read, 10).await.unwrap();

        let outcome = db.mark_failed("wamid.F", 11, Some("Re-engagement message")).await.unwrap();
        assert!(matches!(outcome, StatusOutcome::Applied(ref m) if m.status == Failed));

        for status in [Sent, Delivered, Read] {
            let outcome = db.apply_status("wamid.F", status, 12).await.unwrap();
            assert!(matches!(outcome, StatusOutcome::Stale { current: Failed }));
        }

        let stored = db.find_message_by_provider_id(&chat.account_id, "wamid.F").await.unwrap().unwrap();
        assert_eq!(stored.error_message.as_deref(), Some("Re-engagement message"));
    }

    #[tokio::test]
    async fn unknown_provider_id() {
        let (db, _dir, _chat) = setup().await;
        assert!(matches!(
            db.apply_status("wamid.nope", Delivered, 1).await.unwrap(),
            StatusOutcome::Unknown
        ));
    }

    #[tokio::test]
    async fn failed_send_records_error_without_provider_id() {
        let (db, _dir, chat) = setup().await;
        let message = db
            .create_outbound(outbound(
                &chat,
                OutboundState::Failed {
                    error: "Invalid parameter".into(),
                },
            ))
            .await
            .unwrap();

        assert_eq!(message.status, Failed);
        assert_eq!(message.provider_message_id, None);
        assert_eq!(message.error_message.as_deref(), Some("Invalid parameter"));
    }

    #[tokio::test]
    async fn inbound_is_deduplicated_and_resolves_context() {
        let (db, _dir, chat) = setup().await;
        db.create_outbound(outbound(&chat, sent("wamid.OUT"))).await.unwrap();

        let first = db.create_inbound(inbound(&chat, "wamid.IN", Some("wamid.OUT"))).await.unwrap();
        let first = first.unwrap();
        assert_eq!(first.status, Received);
        assert_eq!(first.context_body.as_deref(), Some("hello"));

        let again = db.create_inbound(inbound(&chat, "wamid.IN", None)).await.unwrap();
        assert!(again.is_none());

        let page = db.list_messages("u1", &chat.id, PageRequest::new(1, 10)).await.unwrap();
        assert_eq!(page.pagination.total, 2);
    }

    #[tokio::test]
    async fn deleting_chat_removes_its_messages() {
        let (db, _dir, chat) = setup().await;
        let message = db.create_outbound(outbound(&chat, sent("wamid.X"))).await.unwrap();

        assert_eq!(db.delete_chats("u2", &[chat.id.clone()]).await.unwrap(), 0);
        assert_eq!(db.delete_chats("u1", &[chat.id.clone()]).await.unwrap(), 1);

        assert!(matches!(db.get_chat("u1", &chat.id).await, Err(DbError::NotFound(_))));
        assert!(matches!(db.get_message("u1", &message.id).await, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_messages_is_owner_scoped() {
        let (db, _dir, chat) = setup().await;
        let message = db.create_outbound(outbound(&chat, sent("wamid.Y"))).await.unwrap();

        assert_eq!(db.delete_messages("u2", &[message.id.clone()]).await.unwrap(), 0);
        assert_eq!(db.delete_messages("u1", &[message.id.clone()]).await.unwrap(), 1);
    }
}
