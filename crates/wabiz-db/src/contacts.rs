use sqlx::{QueryBuilder, Sqlite};
use wabiz_core::phone::normalize_phone;
use wabiz_core::{PageRequest, Paged};

use crate::error::Result;
use crate::models::{Contact, ContactInput};
use crate::repository::{WabizDb, chrono_timestamp};

impl WabizDb {
    /// Inserts or refreshes a contact. Fields left `None` keep their stored value.
    pub async fn upsert_contact(&self, user_id: &str, input: &ContactInput) -> Result<Contact> {
        let now = chrono_timestamp();
        let tags = input
            .tags
            .as_ref()
            .map(|t| serde_json::to_string(t).unwrap_or_else(|_| "[]".into()));

        Ok(sqlx::query_as::<_, Contact>(
            r#"INSERT INTO contacts
               (id, user_id, phone_number, name, image_url, email, tags, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, COALESCE(?7, '[]'), ?8, ?8)
               ON CONFLICT(user_id, phone_number) DO UPDATE SET
                 name = COALESCE(?4, name),
                 image_url = COALESCE(?5, image_url),
                 email = COALESCE(?6, email),
                 tags = COALESCE(?7, tags),
                 updated_at = ?8
               RETURNING *"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(normalize_phone(&input.phone_number))
        .bind(&input.name)
        .bind(&input.image_url)
        .bind(&input.email)
        .bind(tags)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn get_contact_by_phone(&self, user_id: &str, phone: &str) -> Result<Option<Contact>> {
        Ok(sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE user_id = ? AND phone_number = ?",
        )
        .bind(user_id)
        .bind(normalize_phone(phone))
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_contacts(&self, user_id: &str, page: PageRequest) -> Result<Paged<Contact>> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM contacts WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let contacts = sqlx::query_as::<_, Contact>(
            r#"SELECT * FROM contacts WHERE user_id = ?
               ORDER BY COALESCE(name, phone_number) COLLATE NOCASE LIMIT ? OFFSET ?"#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paged::new(contacts, page, total))
    }

    pub async fn delete_contacts(&self, user_id: &str, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut query = QueryBuilder::<Sqlite>::new("DELETE FROM contacts WHERE user_id = ");
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
    use super::*;
    use crate::repository::test_support::*;

    fn input(phone: &str, name: Option<&str>) -> ContactInput {
        ContactInput {
            phone_number: phone.into(),
            name: name.map(Into::into),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_keeps_existing_fields() {
        let (db, _dir) = temp_db().await;

        let first = db
            .upsert_contact(
                "u1",
                &ContactInput {
                    tags: Some(vec!["vip".into()]),
                    email: Some("ana@example.com".into()),
                    ..input("+55 11 98888-7777", Some("Ana"))
                },
            )
            .await
            .unwrap();
        assert_eq!(first.phone_number, "5511988887777");

        let second = db.upsert_contact("u1", &input("5511988887777", None)).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.name.as_deref(), Some("Ana"));
        assert_eq!(second.tags.0, vec!["vip".to_string()]);
        assert_eq!(second.email.as_deref(), Some("ana@example.com"));
    }

    #[tokio::test]
    async fn contacts_are_per_user() {
        let (db, _dir) = temp_db().await;
        let mine = db.upsert_contact("u1", &input("15550002222", Some("Bo"))).await.unwrap();
        db.upsert_contact("u2", &input("15550002222", Some("Other"))).await.unwrap();

        let found = db.get_contact_by_phone("u1", "1 555 000 2222").await.unwrap().unwrap();
        assert_eq!(found.name.as_deref(), Some("Bo"));

        assert_eq!(db.delete_contacts("u2", &[mine.id.clone()]).await.unwrap(), 0);
        assert_eq!(db.delete_contacts("u1", &[mine.id]).await.unwrap(), 1);
        assert_eq!(db.list_contacts("u1", PageRequest::default()).await.unwrap().pagination.total, 0);
    }
}
