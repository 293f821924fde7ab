//! Meta Graph API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, multipart};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::payload::OutboundRequest;
use crate::provider::{CodeMethod, Credentials, MediaInfo, MessagingProvider, SentMessage};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v21.0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub base_url: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    config: GraphConfig,
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// `{base}/{version}/{path}`
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            path
        )
    }

    async fn call(&self, method: Method, url: &str, creds: &Credentials, body: Option<&Value>) -> Result<Value> {
        debug!(%method, url, "Graph request");

        let mut request = self.http.request(method, url).bearer_auth(&creds.access_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_send_error)?;
        read_json(response).await
    }

    async fn post(&self, url: &str, creds: &Credentials, body: &Value) -> Result<Value> {
        self.call(Method::POST, url, creds, Some(body)).await
    }
}

fn map_send_error(err: reqwest::Error) -> GraphError {
    if err.is_timeout() {
        GraphError::Timeout
    } else {
        GraphError::Http(err)
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await.map_err(map_send_error)?;

    if !status.is_success() {
        return Err(GraphError::from_response(status.as_u16(), &text));
    }
    if text.trim().is_empty() {
        return Ok(json!({ "success": true }));
    }
    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl MessagingProvider for GraphClient {
    async fn send_message(&self, creds: &Credentials, request: &OutboundRequest) -> Result<SentMessage> {
        let url = self.url(&format!("{}/messages", creds.phone_number_id));
        let response = self.post(&url, creds, &request.to_graph_json()).await?;

        let id = response["messages"][0]["id"]
            .as_str()
            .ok_or(GraphError::MissingField("messages[0].id"))?;

        debug!(to = %request.to, provider_message_id = id, "Message accepted");
        Ok(SentMessage {
            provider_message_id: id.to_string(),
        })
    }

    async fn upload_media(
        &self,
        creds: &Credentials,
        bytes: Vec<u8>,
        mime_type: &str,
        filename: Option<&str>,
    ) -> Result<String> {
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.unwrap_or("upload").to_string())
            .mime_str(mime_type)
            .map_err(|e| GraphError::InvalidMedia(e.to_string()))?;

        let form = multipart::Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", mime_type.to_string())
            .part("file", part);

        let url = self.url(&format!("{}/media", creds.phone_number_id));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&creds.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        let body = read_json(response).await?;
        let id = body["id"].as_str().ok_or(GraphError::MissingField("id"))?;

        info!(phone_number_id = %creds.phone_number_id, media_id = id, "Media uploaded");
        Ok(id.to_string())
    }

    async fn media_url(&self, creds: &Credentials, media_id: &str) -> Result<MediaInfo> {
        let body = self.call(Method::GET, &self.url(media_id), creds, None).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn register_phone(&self, creds: &Credentials, pin: &str) -> Result<()> {
        let url = self.url(&format!("{}/register", creds.phone_number_id));
        self.post(&url, creds, &json!({ "messaging_product": "whatsapp", "pin": pin }))
            .await?;
        info!(phone_number_id = %creds.phone_number_id, "Phone registered");
        Ok(())
    }

    async fn deregister_phone(&self, creds: &Credentials) -> Result<()> {
        let url = self.url(&format!("{}/deregister", creds.phone_number_id));
        self.post(&url, creds, &json!({})).await?;
        info!(phone_number_id = %creds.phone_number_id, "Phone deregistered");
        Ok(())
    }

    async fn subscribe_app(&self, creds: &Credentials) -> Result<()> {
        let url = self.url(&format!("{}/subscribed_apps", creds.business_account_id));
        self.post(&url, creds, &json!({})).await?;
        info!(phone_number_id = %creds.phone_number_id, "App subscribed");
        Ok(())
    }

    async fn unsubscribe_app(&self, creds: &Credentials) -> Result<()> {
        let url = self.url(&format!("{}/subscribed_apps", creds.business_account_id));
        self.call(Method::DELETE, &url, creds, None).await?;
        info!(phone_number_id = %creds.phone_number_id, "App unsubscribed");
        Ok(())
    }

    async fn request_code(&self, creds: &Credentials, method: CodeMethod, language: &str) -> Result<()> {
        let url = self.url(&format!("{}/request_code", creds.phone_number_id));
        self.post(
            &url,
            creds,
            &json!({ "code_method": method.as_str(), "language": language }),
        )
        .await?;
        info!(phone_number_id = %creds.phone_number_id, method = method.as_str(), "Verification code requested");
        Ok(())
    }

    async fn verify_code(&self, creds: &Credentials, code: &str) -> Result<()> {
        let url = self.url(&format!("{}/verify_code", creds.phone_number_id));
        self.post(&url, creds, &json!({ "code": code })).await?;
        info!(phone_number_id = %creds.phone_number_id, "Phone verified");
        Ok(())
    }
}
