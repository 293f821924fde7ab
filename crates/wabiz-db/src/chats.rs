use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};
use wabiz_core::{ChatType, PageRequest, Paged, Participant};

use crate::error::{DbError, Result};
use crate::models::Chat;
use crate::repository::{WabizDb, chrono_timestamp};

impl WabizDb {
    pub async fn find_single_chat(
        &self,
        user_id: &str,
        account_id: &str,
        number: &str,
    ) -> Result<Option<Chat>> {
        Ok(sqlx::query_as::<_, Chat>(
            r#"SELECT * FROM chats
               WHERE user_id = ? AND account_id = ? AND primary_number = ? AND chat_type = 'single'"#,
        )
        .bind(user_id)
        .bind(account_id)
        .bind(number)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Creates the single chat for `participant`, or returns the one a concurrent
    /// caller created first.
    pub async fn create_single_chat(
        &self,
        user_id: &str,
        account_id: &str,
        participant: Participant,
    ) -> Result<Chat> {
        let now = chrono_timestamp();
        let id = uuid::Uuid::new_v4().to_string();
        let number = participant.number.clone();

        let inserted = sqlx::query(
            r#"INSERT OR IGNORE INTO chats
               (id, user_id, account_id, participants, chat_type, primary_number, created_at, updated_at)
               VALUES (?, ?, ?, ?, 'single', ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(account_id)
        .bind(Json(vec![participant]))
        .bind(&number)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            tracing::debug!(chat_id = %id, number = %number, "Chat created");
        }

        self.find_single_chat(user_id, account_id, &number)
            .await?
            .ok_or(DbError::NotFound("Chat"))
    }

    pub async fn create_broadcast_chat(
        &self,
        user_id: &str,
        account_id: &str,
        name: &str,
        participants: Vec<Participant>,
    ) -> Result<Chat> {
        let now = chrono_timestamp();

        let chat = sqlx::query_as::<_, Chat>(
            r#"INSERT INTO chats
               (id, user_id, account_id, participants, chat_type, name, created_at, updated_at)
               VALUES (?, ?, ?, ?, 'broadcast', ?, ?, ?)
               RETURNING *"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(account_id)
        .bind(Json(participants))
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(chat_id = %chat.id, recipients = chat.participants.len(), "Broadcast chat created");
        Ok(chat)
    }

    pub async fn get_chat(&self, user_id: &str, id: &str) -> Result<Chat> {
        sqlx::query_as::<_, Chat>("SELECT * FROM chats WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound("Chat"))
    }

    pub async fn list_chats(
        &self,
        user_id: &str,
        account_id: Option<&str>,
        page: PageRequest,
    ) -> Result<Paged<Chat>> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM chats WHERE user_id = ?1 AND (?2 IS NULL OR account_id = ?2)",
        )
        .bind(user_id)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        let chats = sqlx::query_as::<_, Chat>(
            r#"SELECT * FROM chats
               WHERE user_id = ?1 AND (?2 IS NULL OR account_id = ?2)
               ORDER BY COALESCE(last_message_at, created_at) DESC, id
               LIMIT ?3 OFFSET ?4"#,
        )
        .bind(user_id)
        .bind(account_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paged::new(chats, page, total))
    }

    /// Updates the chat preview; `bump_unread` adds one to the unread counter.
    pub async fn touch_chat(
        &self,
        chat_id: &str,
        preview: Option<&str>,
        at: i64,
        bump_unread: bool,
    ) -> Result<Chat> {
        sqlx::query_as::<_, Chat>(
            r#"UPDATE chats SET
                 last_message = COALESCE(?, last_message),
                 last_message_at = ?,
                 unread_count = unread_count + ?,
                 updated_at = ?
               WHERE id = ? RETURNING *"#,
        )
        .bind(preview)
        .bind(at)
        .bind(i64::from(bump_unread))
        .bind(chrono_timestamp())
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound("Chat"))
    }

    pub async fn mark_chat_read(&self, user_id: &str, id: &str) -> Result<Chat> {
        sqlx::query_as::<_, Chat>(
            "UPDATE chats SET unread_count = 0, updated_at = ? WHERE id = ? AND user_id = ? RETURNING *",
        )
        .bind(chrono_timestamp())
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound("Chat"))
    }

    pub async fn set_favourite(&self, user_id: &str, id: &str, favourite: bool) -> Result<Chat> {
        sqlx::query_as::<_, Chat>(
            "UPDATE chats SET is_favourite = ?, updated_at = ? WHERE id = ? AND user_id = ? RETURNING *",
        )
        .bind(favourite)
        .bind(chrono_timestamp())
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound("Chat"))
    }

    /// Deletes chats and their messages in one transaction. Returns the number of
    /// chats removed; ids owned by another user are skipped.
    pub async fn delete_chats(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let mut messages = QueryBuilder::<Sqlite>::new(
            "DELETE FROM messages WHERE chat_id IN (SELECT id FROM chats WHERE user_id = ",
        );
        messages.push_bind(user_id);
        messages.push(" AND id IN (");
        let mut list = messages.separated(", ");
        for id in ids {
            list.push_bind(id.as_str());
        }
        list.push_unseparated("))");
        let removed_messages = messages.build().execute(&mut *tx).await?.rows_affected();

        let mut chats = QueryBuilder::<Sqlite>::new("DELETE FROM chats WHERE user_id = ");
        chats.push_bind(user_id);
        chats.push(" AND id IN (");
        let mut list = chats.separated(", ");
        for id in ids {
            list.push_bind(id.as_str());
        }
        list.push_unseparated(")");
        let removed = chats.build().execute(&mut *tx).await?.rows_affected();

        tx.commit().await?;

        tracing::info!(user_id, chats = removed, messages = removed_messages, "Chats deleted");
        Ok(removed)
    }
}

impl Chat {
    pub fn is_broadcast(&self) -> bool {
        self.chat_type == ChatType::Broadcast
    }
}
