use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use wabiz_db::{FieldCipher, WabizDb};
use wabiz_graph::{
    AutoReplyHook, AutoReplyRequest, CodeMethod, Credentials, GraphError, MediaInfo, MessagingProvider,
    OutboundRequest, SentMessage,
};
use wabiz_worker::{AccountInput, WabizWorker, WorkerSettings};

use crate::state::{AppState, WebhookSecrets};

type GraphResult<T> = Result<T, GraphError>;

pub const VERIFY_TOKEN: &str = "hook-verify";
pub const APP_SECRET: &str = "hook-secret";
pub const PAYMENT_SECRET: &str = "pay-secret";

/// Accepts everything unless told to fail.
#[derive(Default)]
pub struct StubProvider {
    failure: Mutex<Option<String>>,
}

impl StubProvider {
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    fn check(&self) -> GraphResult<()> {
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(GraphError::Api { status: 400, message }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessagingProvider for StubProvider {
    async fn send_message(&self, _: &Credentials, request: &OutboundRequest) -> GraphResult<SentMessage> {
        self.check()?;
        Ok(SentMessage {
            provider_message_id: format!("wamid.{}", request.to),
        })
    }

    async fn upload_media(&self, _: &Credentials, _: Vec<u8>, _: &str, _: Option<&str>) -> GraphResult<String> {
        self.check()?;
        Ok("media-9".into())
    }

    async fn media_url(&self, _: &Credentials, media_id: &str) -> GraphResult<MediaInfo> {
        self.check()?;
        Ok(MediaInfo {
            id: media_id.into(),
            url: "https://cdn.example.test/file".into(),
            mime_type: None,
            file_size: None,
        })
    }

    async fn register_phone(&self, _: &Credentials, _: &str) -> GraphResult<()> {
        self.check()
    }

    async fn deregister_phone(&self, _: &Credentials) -> GraphResult<()> {
        self.check()
    }

    async fn subscribe_app(&self, _: &Credentials) -> GraphResult<()> {
        self.check()
    }

    async fn unsubscribe_app(&self, _: &Credentials) -> GraphResult<()> {
        self.check()
    }

    async fn request_code(&self, _: &Credentials, _: CodeMethod, _: &str) -> GraphResult<()> {
        self.check()
    }

    async fn verify_code(&self, _: &Credentials, _: &str) -> GraphResult<()> {
        self.check()
    }
}

pub struct SilentAutoReply;

#[async_trait]
impl AutoReplyHook for SilentAutoReply {
    async fn reply(&self, _: &AutoReplyRequest) -> GraphResult<Option<String>> {
        Ok(None)
    }
}

pub struct TestApp {
    pub router: Router,
    pub worker: WabizWorker,
    pub provider: Arc<StubProvider>,
    pub token: String,
    pub account_id: String,
    _dir: tempfile::TempDir,
}

pub async fn app() -> TestApp {
    app_with(WorkerSettings {
        payment_secret: Some(PAYMENT_SECRET.into()),
        ..Default::default()
    })
    .await
}

pub async fn app_with(settings: WorkerSettings) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = WabizDb::new_with_path(dir.path().join("server.db")).await.unwrap();
    let provider = Arc::new(StubProvider::default());
    let worker = WabizWorker::new(
        db,
        provider.clone(),
        Arc::new(SilentAutoReply),
        FieldCipher::new(&[9u8; 32]),
        settings,
    );

    let account = worker
        .create_account(
            "u1",
            AccountInput {
                name: None,
                phone_number_id: "pn-1".into(),
                display_phone_number: Some("15550001111".into()),
                business_account_id: "waba-1".into(),
                access_token: "token-1".into(),
            },
        )
        .await
        .unwrap();
    let (_, token) = worker.create_api_token("u1", "tests").await.unwrap();

    let state = AppState::new(
        worker.clone(),
        WebhookSecrets {
            verify_token: Some(VERIFY_TOKEN.into()),
            app_secret: Some(APP_SECRET.into()),
        },
    );

    TestApp {
        router: crate::routes::router(state),
        worker,
        provider,
        token,
        account_id: account.id,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, Some(&self.token), body).await
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let (status, bytes) = self.raw(request).await;
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn raw(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }
}
