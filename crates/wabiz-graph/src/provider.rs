use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::payload::OutboundRequest;

/// Plaintext account credentials, held only for the duration of a request.
#[derive(Clone)]
pub struct Credentials {
    pub phone_number_id: String,
    pub business_account_id: String,
    pub access_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("phone_number_id", &self.phone_number_id)
            .field("business_account_id", &self.business_account_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub provider_message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CodeMethod {
    #[default]
    Sms,
    Voice,
}

impl CodeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeMethod::Sms => "SMS",
            CodeMethod::Voice => "VOICE",
        }
    }
}

/// Everything the backend asks of the messaging provider.
///
/// Each call is a single attempt bounded by the client timeout; callers decide
/// what a failure means.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, creds: &Credentials, request: &OutboundRequest) -> Result<SentMessage>;

    async fn upload_media(
        &self,
        creds: &Credentials,
        bytes: Vec<u8>,
        mime_type: &str,
        filename: Option<&str>,
    ) -> Result<String>;

    async fn media_url(&self, creds: &Credentials, media_id: &str) -> Result<MediaInfo>;

    async fn register_phone(&self, creds: &Credentials, pin: &str) -> Result<()>;

    async fn deregister_phone(&self, creds: &Credentials) -> Result<()>;

    async fn subscribe_app(&self, creds: &Credentials) -> Result<()>;

    async fn unsubscribe_app(&self, creds: &Credentials) -> Result<()>;

    async fn request_code(&self, creds: &Credentials, method: CodeMethod, language: &str) -> Result<()>;

    async fn verify_code(&self, creds: &Credentials, code: &str) -> Result<()>;
}
