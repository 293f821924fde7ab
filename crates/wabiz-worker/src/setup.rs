use serde::Deserialize;
use wabiz_core::phone::{is_valid_phone, normalize_phone};
use wabiz_db::{Account, NewAccount, SetupFlag};
use wabiz_graph::{CodeMethod, Credentials};

use crate::error::{Result, WorkerError};
use crate::worker::WabizWorker;

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInput {
    #[serde(default)]
    pub name: Option<String>,
    pub phone_number_id: String,
    #[serde(default)]
    pub display_phone_number: Option<String>,
    pub business_account_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoReplyConfig {
    pub active: bool,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn required(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(WorkerError::Validation(format!("{field} is required")));
    }
    Ok(())
}

impl WabizWorker {
    pub async fn create_account(&self, user_id: &str, input: AccountInput) -> Result<Account> {
        required(&input.phone_number_id, "phone_number_id")?;
        required(&input.business_account_id, "business_account_id")?;
        required(&input.access_token, "access_token")?;

        let account = self
            .db
            .create_account(NewAccount {
                user_id: user_id.to_string(),
                name: input.name,
                phone_number_id: input.phone_number_id.trim().to_string(),
                display_phone_number: input.display_phone_number.map(|n| normalize_phone(&n)),
                business_account_id: self.cipher.seal(input.business_account_id.trim())?,
                access_token: self.cipher.seal(input.access_token.trim())?,
            })
            .await?;
        Ok(account)
    }

    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>> {
        Ok(self.db.list_accounts(user_id).await?)
    }

    pub async fn get_account(&self, user_id: &str, id: &str) -> Result<Account> {
        Ok(self.db.get_account(user_id, id).await?)
    }

    pub async fn set_default_account(&self, user_id: &str, id: &str) -> Result<Account> {
        Ok(self.db.set_default_account(user_id, id).await?)
    }

    /// The named account, or the user's default when none is named.
    pub(crate) async fn sending_account(&self, user_id: &str, account_id: Option<&str>) -> Result<Account> {
        let account = match account_id {
            Some(id) => self.db.get_account(user_id, id).await?,
            None => self
                .db
                .default_account(user_id)
                .await?
                .ok_or(WorkerError::NotFound("Account"))?,
        };
        if account.disabled {
            return Err(WorkerError::Validation("Account is disabled".into()));
        }
        Ok(account)
    }

    pub(crate) fn credentials(&self, account: &Account) -> Result<Credentials> {
        Ok(Credentials {
            phone_number_id: account.phone_number_id.clone(),
            business_account_id: self.cipher.open(&account.business_account_id)?,
            access_token: self.cipher.open(&account.access_token)?,
        })
    }

    pub async fn register_phone(&self, user_id: &str, id: &str, pin: &str) -> Result<Account> {
        if pin.len() != 6 || !pin.chars().all(|c| c.is_ascii_digit()) {
            return Err(WorkerError::Validation("PIN must be 6 digits".into()));
        }
        let account = self.db.get_account(user_id, id).await?;
        self.provider.register_phone(&self.credentials(&account)?, pin).await?;
        Ok(self.db.set_setup_flag(id, SetupFlag::PhoneRegistered, true).await?)
    }

    pub async fn deregister_phone(&self, user_id: &str, id: &str) -> Result<Account> {
        let account = self.db.get_account(user_id, id).await?;
        self.provider.deregister_phone(&self.credentials(&account)?).await?;
        Ok(self.db.set_setup_flag(id, SetupFlag::PhoneRegistered, false).await?)
    }

    pub async fn subscribe_app(&self, user_id: &str, id: &str) -> Result<Account> {
        let account = self.db.get_account(user_id, id).await?;
        self.provider.subscribe_app(&self.credentials(&account)?).await?;
        Ok(self.db.set_setup_flag(id, SetupFlag::AppSubscribed, true).await?)
    }

    pub async fn unsubscribe_app(&self, user_id: &str, id: &str) -> Result<Account> {
        let account = self.db.get_account(user_id, id).await?;
        self.provider.unsubscribe_app(&self.credentials(&account)?).await?;
        Ok(self.db.set_setup_flag(id, SetupFlag::AppSubscribed, false).await?)
    }

    /// Asks the provider to send a verification code, at most once per cooldown.
    pub async fn request_verification_code(
        &self,
        user_id: &str,
        id: &str,
        method: CodeMethod,
        language: &str,
    ) -> Result<()> {
        let account = self.db.get_account(user_id, id).await?;
        let now = chrono::Utc::now().timestamp();
        let cooldown = self.settings.code_cooldown_secs;

        if self.db.claim_code_request(id, now, cooldown).await?.is_none() {
            let last = account.code_requested_at.unwrap_or(now);
            return Err(WorkerError::RateLimited {
                retry_after_secs: (last + cooldown - now).max(1),
            });
        }

        let result = self
            .provider
            .request_code(&self.credentials(&account)?, method, language)
            .await;

        if let Err(err) = result {
            self.db.restore_code_request(id, account.code_requested_at).await?;
            return Err(err.into());
        }
        Ok(())
    }

    pub async fn verify_code(&self, user_id: &str, id: &str, code: &str) -> Result<Account> {
        required(code, "code")?;
        let account = self.db.get_account(user_id, id).await?;
        self.provider.verify_code(&self.credentials(&account)?, code.trim()).await?;
        Ok(self.db.set_setup_flag(id, SetupFlag::PhoneVerified, true).await?)
    }

    pub async fn block_number(&self, user_id: &str, id: &str, number: &str) -> Result<Account> {
        if !is_valid_phone(number) {
            return Err(WorkerError::Validation(format!("Invalid phone number: {number}")));
        }
        let account = self.db.get_account(user_id, id).await?;
        let number = normalize_phone(number);

        let mut blocked = account.blocked_numbers.0.clone();
        if blocked.contains(&number) {
            return Ok(account);
        }
        blocked.push(number);
        Ok(self.db.set_blocked_numbers(user_id, id, &blocked).await?)
    }

    pub async fn unblock_number(&self, user_id: &str, id: &str, number: &str) -> Result<Account> {
        let account = self.db.get_account(user_id, id).await?;
        let number = normalize_phone(number);

        let blocked: Vec<String> = account
            .blocked_numbers
            .iter()
            .filter(|b| **b != number)
            .cloned()
            .collect();
        Ok(self.db.set_blocked_numbers(user_id, id, &blocked).await?)
    }

    pub async fn set_auto_reply(&self, user_id: &str, id: &str, config: AutoReplyConfig) -> Result<Account> {
        let url = config
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        if let Some(url) = url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(WorkerError::Validation("webhook_url must be an http(s) URL".into()));
            }
        } else if config.active {
            return Err(WorkerError::Validation("webhook_url is required to enable auto-reply".into()));
        }

        Ok(self
            .db
            .set_auto_reply(user_id, id, config.active, config.prompt.as_deref(), url)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[tokio::test]
    async fn credentials_are_sealed_at_rest() {
        let h = harness().await;
        assert_ne!(h.account.access_token.as_str(), "token-1");
        assert!(h.account.is_default);

        let creds = h.worker.credentials(&h.account).unwrap();
        assert_eq!(creds.access_token, "token-1");
        assert_eq!(creds.business_account_id, "waba-1");
    }

    #[tokio::test]
    async fn second_code_request_is_throttled() {
        let h = harness().await;
        h.worker
            .request_verification_code("u1", &h.account.id, CodeMethod::Sms, "en_US")
            .await
            .unwrap();

        let err = h
            .worker
            .request_verification_code("u1", &h.account.id, CodeMethod::Voice, "en_US")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::RateLimited { retry_after_secs } if retry_after_secs > 0));
        assert_eq!(h.provider.code_requests(), 1);
    }

    #[tokio::test]
    async fn failed_code_request_does_not_start_cooldown() {
        let h = harness().await;
        h.provider.fail_with("Phone number is not eligible");
        h.worker
            .request_verification_code("u1", &h.account.id, CodeMethod::Sms, "en_US")
            .await
            .unwrap_err();

        h.provider.recover();
        h.worker
            .request_verification_code("u1", &h.account.id, CodeMethod::Sms, "en_US")
            .await
            .unwrap();
        assert_eq!(h.provider.code_requests(), 1);
    }

    #[tokio::test]
    async fn setup_calls_flip_flags() {
        let h = harness().await;
        let id = &h.account.id;

        let err = h.worker.register_phone("u1", id, "12ab56").await.unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));

        assert!(h.worker.register_phone("u1", id, "123456").await.unwrap().phone_registered);
        assert!(h.worker.subscribe_app("u1", id).await.unwrap().app_subscribed);
        assert!(!h.worker.unsubscribe_app("u1", id).await.unwrap().app_subscribed);

        let err = h.worker.verify_code("u1", id, "000000").await.unwrap_err();
        assert_eq!(err.to_string(), "The verification code you entered is incorrect.");
        assert!(h.worker.verify_code("u1", id, "123456").await.unwrap().phone_verified);
    }

    #[tokio::test]
    async fn default_account_moves() {
        let h = harness().await;
        let second = h
            .worker
            .create_account(
                "u1",
                AccountInput {
                    name: None,
                    phone_number_id: "pn-2".into(),
                    display_phone_number: None,
                    business_account_id: "waba-2".into(),
                    access_token: "token-2".into(),
                },
            )
            .await
            .unwrap();
        assert!(!second.is_default);

        h.worker.set_default_account("u1", &second.id).await.unwrap();
        let accounts = h.worker.list_accounts("u1").await.unwrap();
        let defaults: Vec<_> = accounts.iter().filter(|a| a.is_default).map(|a| a.id.clone()).collect();
        assert_eq!(defaults, vec![second.id]);
    }

    #[tokio::test]
    async fn auto_reply_needs_http_url() {
        let h = harness().await;
        let err = h
            .worker
            .set_auto_reply(
                "u1",
                &h.account.id,
                AutoReplyConfig {
                    active: true,
                    prompt: None,
                    webhook_url: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));

        let err = h
            .worker
            .set_auto_reply(
                "u1",
                &h.account.id,
                AutoReplyConfig {
                    active: false,
                    prompt: None,
                    webhook_url: Some("ftp://bot".into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Validation(_)));
    }

    #[tokio::test]
    async fn block_list_is_normalized() {
        let h = harness().await;
        let account = h.worker.block_number("u1", &h.account.id, "+1 (555) 000-2222").await.unwrap();
        assert!(account.is_blocked("15550002222"));

        let account = h.worker.unblock_number("u1", &h.account.id, "15550002222").await.unwrap();
        assert!(!account.is_blocked("15550002222"));
    }
}
