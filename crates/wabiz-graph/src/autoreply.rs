use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct AutoReplyRequest {
    #[serde(skip)]
    pub url: String,
    pub prompt: Option<String>,
    pub message: String,
    pub from: String,
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
struct AutoReplyResponse {
    #[serde(default)]
    reply: Option<String>,
}

/// External responder consulted for inbound text when auto-reply is on.
#[async_trait]
pub trait AutoReplyHook: Send + Sync {
    /// Returns the text to send back, or `None` when the hook has nothing to say.
    async fn reply(&self, request: &AutoReplyRequest) -> Result<Option<String>>;
}

pub struct HttpAutoReply {
    http: reqwest::Client,
}

impl HttpAutoReply {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl AutoReplyHook for HttpAutoReply {
    async fn reply(&self, request: &AutoReplyRequest) -> Result<Option<String>> {
        let response = self
            .http
            .post(&request.url)
            .json(request)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { GraphError::Timeout } else { GraphError::Http(e) })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::from_response(status.as_u16(), &body));
        }

        let body: AutoReplyResponse = response.json().await?;
        Ok(body.reply.filter(|r| !r.trim().is_empty()))
    }
}
