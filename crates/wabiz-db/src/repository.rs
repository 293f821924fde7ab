use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{Pool, Sqlite};

use crate::error::{DbError, Result};
use crate::models::{Account, NewAccount, SetupFlag};
use crate::schema::SCHEMA;

#[derive(Clone)]
pub struct WabizDb {
    pub(crate) pool: Pool<Sqlite>,
}

impl WabizDb {
    /// Opens the database in the platform data directory.
    pub async fn new() -> Result<Self> {
        let db_path = Self::default_path()?;

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let db = Self::new_with_path(&db_path).await?;
        tracing::info!("Database initialized at: {}", db_path.display());
        Ok(db)
    }

    pub async fn new_with_path(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("io", "wabiz", "wabiz").ok_or(DbError::NoDataDir)?;
        Ok(dirs.data_dir().join("wabiz.db"))
    }

    /// Waits for checked-out connections and closes the pool. Later queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Inserts an account. The user's first account becomes the default.
    pub async fn create_account(&self, new: NewAccount) -> Result<Account> {
        let now = chrono_timestamp();
        let id = uuid::Uuid::new_v4().to_string();

        let account = sqlx::query_as::<_, Account>(
            r#"INSERT INTO accounts
               (id, user_id, name, phone_number_id, display_phone_number, business_account_id,
                access_token, is_default, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                       NOT EXISTS (SELECT 1 FROM accounts WHERE user_id = ?2 AND is_default = 1),
                       ?8, ?8)
               RETURNING *"#,
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.name)
        .bind(&new.phone_number_id)
        .bind(&new.display_phone_number)
        .bind(&new.business_account_id)
        .bind(&new.access_token)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DbError::Conflict(format!("Phone number id {} is already connected", new.phone_number_id))
            }
            other => DbError::Sqlx(other),
        })?;

        tracing::info!(account_id = %account.id, user_id = %account.user_id, "Account created");
        Ok(account)
    }

    pub async fn get_account(&self, user_id: &str, id: &str) -> Result<Account> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound("Account"))
    }

    /// Webhook lookup; the Graph API addresses accounts by phone number id.
    pub async fn find_account_by_phone_number_id(
        &self,
        phone_number_id: &str,
    ) -> Result<Option<Account>> {
        Ok(
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE phone_number_id = ?")
                .bind(phone_number_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        Ok(sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE user_id = ? ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn default_account(&self, user_id: &str) -> Result<Option<Account>> {
        Ok(sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE user_id = ? AND is_default = 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn set_default_account(&self, user_id: &str, id: &str) -> Result<Account> {
        let now = chrono_timestamp();
        let mut tx = self.pool.begin().await?;

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM accounts WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(DbError::NotFound("Account"));
        }

        sqlx::query("UPDATE accounts SET is_default = 0, updated_at = ? WHERE user_id = ? AND is_default = 1")
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let account = sqlx::query_as::<_, Account>(
            "UPDATE accounts SET is_default = 1, updated_at = ? WHERE id = ? RETURNING *",
        )
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(account)
    }

    pub async fn set_setup_flag(&self, id: &str, flag: SetupFlag, value: bool) -> Result<Account> {
        let sql = format!(
            "UPDATE accounts SET {} = ?, updated_at = ? WHERE id = ? RETURNING *",
            flag.column()
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(value)
            .bind(chrono_timestamp())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DbError::NotFound("Account"))
    }

    /// Records a verification-code request unless one was made within
    /// `cooldown_secs`. Returns `None` while the cooldown is running.
    pub async fn claim_code_request(&self, id: &str, now: i64, cooldown_secs: i64) -> Result<Option<Account>> {
        Ok(sqlx::query_as::<_, Account>(
            r#"UPDATE accounts SET code_requested_at = ?1, updated_at = ?1
               WHERE id = ?2 AND (code_requested_at IS NULL OR code_requested_at <= ?1 - ?3)
               RETURNING *"#,
        )
        .bind(now)
        .bind(id)
        .bind(cooldown_secs)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Puts back the previous request time after a request the provider rejected.
    pub async fn restore_code_request(&self, id: &str, previous: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE accounts SET code_requested_at = ?, updated_at = ? WHERE id = ?")
            .bind(previous)
            .bind(chrono_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_blocked_numbers(
        &self,
        user_id: &str,
        id: &str,
        numbers: &[String],
    ) -> Result<Account> {
        sqlx::query_as::<_, Account>(
            "UPDATE accounts SET blocked_numbers = ?, updated_at = ? WHERE id = ? AND user_id = ? RETURNING *",
        )
        .bind(Json(numbers))
        .bind(chrono_timestamp())
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound("Account"))
    }

    pub async fn set_auto_reply(
        &self,
        user_id: &str,
        id: &str,
        active: bool,
        prompt: Option<&str>,
        webhook_url: Option<&str>,
    ) -> Result<Account> {
        sqlx::query_as::<_, Account>(
            r#"UPDATE accounts SET ai_active = ?, ai_prompt = ?, ai_webhook_url = ?, updated_at = ?
               WHERE id = ? AND user_id = ? RETURNING *"#,
        )
        .bind(active)
        .bind(prompt)
        .bind(webhook_url)
        .bind(chrono_timestamp())
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound("Account"))
    }
}

pub(crate) fn chrono_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn first_account_is_default() {
        let (db, _dir) = temp_db().await;
        let a = db.create_account(new_account("u1", "pn-1")).await.unwrap();
        let b = db.create_account(new_account("u1", "pn-2")).await.unwrap();
        assert!(a.is_default);
        assert!(!b.is_default);

        let other = db.create_account(new_account("u2", "pn-3")).await.unwrap();
        assert!(other.is_default);
    }

    #[tokio::test]
    async fn set_default_moves_the_flag() {
        let (db, _dir) = temp_db().await;
        let a = db.create_account(new_account("u1", "pn-1")).await.unwrap();
        let b = db.create_account(new_account("u1", "pn-2")).await.unwrap();

        db.set_default_account("u1", &b.id).await.unwrap();

        let default = db.default_account("u1").await.unwrap().unwrap();
        assert_eq!(default.id, b.id);
        assert!(!db.get_account("u1", &a.id).await.unwrap().is_default);
    }

    #[tokio::test]
    async fn foreign_account_is_not_found() {
        let (db, _dir) = temp_db().await;
        let a = db.create_account(new_account("u1", "pn-1")).await.unwrap();

        assert!(matches!(db.get_account("u2", &a.id).await, Err(DbError::NotFound(_))));
        assert!(matches!(
            db.set_default_account("u2", &a.id).await,
            Err(DbError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn blocked_numbers_round_trip() {
        let (db, _dir) = temp_db().await;
        let a = db.create_account(new_account("u1", "pn-1")).await.unwrap();

        let updated = db
            .set_blocked_numbers("u1", &a.id, &["5511999999999".to_string()])
            .await
            .unwrap();
        assert!(updated.is_blocked("+55 11 99999-9999"));
        assert!(!updated.is_blocked("15550002222"));
    }

    #[tokio::test]
    async fn duplicate_phone_number_id_conflicts() {
        let (db, _dir) = temp_db().await;
        db.create_account(new_account("u1", "pn-1")).await.unwrap();
        assert!(matches!(
            db.create_account(new_account("u2", "pn-1")).await,
            Err(DbError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn code_request_cooldown() {
        let (db, _dir) = temp_db().await;
        let a = db.create_account(new_account("u1", "pn-1")).await.unwrap();

        assert!(db.claim_code_request(&a.id, 1000, 60).await.unwrap().is_some());
        assert!(db.claim_code_request(&a.id, 1030, 60).await.unwrap().is_none());
        assert!(db.claim_code_request(&a.id, 1060, 60).await.unwrap().is_some());

        db.restore_code_request(&a.id, None).await.unwrap();
        assert!(db.claim_code_request(&a.id, 1061, 60).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn setup_flags_update() {
        let (db, _dir) = temp_db().await;
        let a = db.create_account(new_account("u1", "pn-1")).await.unwrap();

        let a = db.set_setup_flag(&a.id, SetupFlag::AppSubscribed, true).await.unwrap();
        assert!(a.app_subscribed);
        assert!(!a.phone_registered);

        let found = db.find_account_by_phone_number_id("pn-1").await.unwrap().unwrap();
        assert_eq!(found.id, a.id);
    }
}
