use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{DbError, Result};
use crate::models::ApiToken;
use crate::repository::{WabizDb, chrono_timestamp};

pub const TOKEN_PREFIX: &str = "wbz_";

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

impl WabizDb {
    /// Issues a new API token. The plaintext is returned once and never stored.
    pub async fn create_api_token(&self, user_id: &str, name: &str) -> Result<(ApiToken, String)> {
        let plaintext = generate_token();
        let prefix: String = plaintext.chars().take(TOKEN_PREFIX.len() + 6).collect();

        let token = sqlx::query_as::<_, ApiToken>(
            r#"INSERT INTO api_tokens (id, user_id, name, prefix, token_hash, created_at)
               VALUES (?, ?, ?, ?, ?, ?)
               RETURNING *"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(name)
        .bind(&prefix)
        .bind(hash_token(&plaintext))
        .bind(chrono_timestamp())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id, token_id = %token.id, "API token created");
        Ok((token, plaintext))
    }

    /// Resolves a presented token and records its use.
    pub async fn authenticate_token(&self, plaintext: &str) -> Result<Option<ApiToken>> {
        if !plaintext.starts_with(TOKEN_PREFIX) {
            return Ok(None);
        }

        Ok(sqlx::query_as::<_, ApiToken>(
            "UPDATE api_tokens SET last_used_at = ? WHERE token_hash = ? RETURNING *",
        )
        .bind(chrono_timestamp())
        .bind(hash_token(plaintext))
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_api_tokens(&self, user_id: &str) -> Result<Vec<ApiToken>> {
        Ok(sqlx::query_as::<_, ApiToken>(
            "SELECT * FROM api_tokens WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn revoke_api_token(&self, user_id: &str, id: &str) -> Result<()> {
        let removed = sqlx::query("DELETE FROM api_tokens WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if removed == 0 {
            return Err(DbError::NotFound("Token"));
        }
        tracing::info!(user_id, token_id = id, "API token revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::*;

    #[tokio::test]
    async fn issued_token_authenticates() {
        let (db, _dir) = temp_db().await;
        let (token, plaintext) = db.create_api_token("u1", "ci").await.unwrap();

        assert!(plaintext.starts_with("wbz_"));
        assert_eq!(plaintext.len(), 4 + 32);
        assert_ne!(token.token_hash, plaintext);
        assert!(plaintext.starts_with(&token.prefix));

        let found = db.authenticate_token(&plaintext).await.unwrap().unwrap();
        assert_eq!(found.user_id, "u1");
        assert!(found.last_used_at.is_some());

        assert!(db.authenticate_token("wbz_nope").await.unwrap().is_none());
        assert!(db.authenticate_token("Bearer x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_token_stops_working() {
        let (db, _dir) = temp_db().await;
        let (token, plaintext) = db.create_api_token("u1", "ci").await.unwrap();

        assert!(matches!(
            db.revoke_api_token("u2", &token.id).await,
            Err(DbError::NotFound(_))
        ));
        db.revoke_api_token("u1", &token.id).await.unwrap();

        assert!(db.authenticate_token(&plaintext).await.unwrap().is_none());
        assert!(db.list_api_tokens("u1").await.unwrap().is_empty());
    }
}
