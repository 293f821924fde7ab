use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wabiz_db::{Account, FieldCipher, WabizDb};
use wabiz_graph::{
    AutoReplyHook, AutoReplyRequest, CodeMethod, Credentials, GraphError, MediaInfo, MessagingProvider,
    OutboundRequest, SentMessage,
};

use crate::dispatcher::{Outgoing, SendOutcome, SendTarget};
use crate::setup::{AccountInput, AutoReplyConfig};
use crate::worker::{WabizWorker, WorkerSettings};

type GraphResult<T> = std::result::Result<T, GraphError>;

pub const PAYMENT_SECRET: &str = "test-payment-secret";

/// Records every call and answers with canned ids, or with a configured error.
#[derive(Default)]
pub struct MockProvider {
    sent: Mutex<Vec<OutboundRequest>>,
    failure: Mutex<Option<String>>,
    code_requests: AtomicUsize,
    counter: AtomicUsize,
    close_after_send: Mutex<Option<WabizDb>>,
}

impl MockProvider {
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// Closes `db` once the next message has been accepted, so storing it fails.
    pub fn close_store_after_send(&self, db: WabizDb) {
        *self.close_after_send.lock().unwrap() = Some(db);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Requests the provider accepted.
    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn code_requests(&self) -> usize {
        self.code_requests.load(Ordering::SeqCst)
    }

    fn check(&self) -> GraphResult<()> {
        match self.failure.lock().unwrap().clone() {
            Some(message) => Err(GraphError::Api { status: 400, message }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessagingProvider for MockProvider {
    async fn send_message(&self, _creds: &Credentials, request: &OutboundRequest) -> GraphResult<SentMessage> {
        self.check()?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(request.clone());
        let store = self.close_after_send.lock().unwrap().take();
        if let Some(db) = store {
            db.close().await;
        }
        Ok(SentMessage {
            provider_message_id: format!("wamid.out{n}"),
        })
    }

    async fn upload_media(
        &self,
        _creds: &Credentials,
        _bytes: Vec<u8>,
        _mime_type: &str,
        _filename: Option<&str>,
    ) -> GraphResult<String> {
        self.check()?;
        Ok("media-1".into())
    }

    async fn media_url(&self, _creds: &Credentials, media_id: &str) -> GraphResult<MediaInfo> {
        self.check()?;
        Ok(MediaInfo {
            id: media_id.to_string(),
            url: format!("https://cdn.example.test/{media_id}"),
            mime_type: Some("application/pdf".into()),
            file_size: Some(8),
        })
    }

    async fn register_phone(&self, _creds: &Credentials, _pin: &str) -> GraphResult<()> {
        self.check()
    }

    async fn deregister_phone(&self, _creds: &Credentials) -> GraphResult<()> {
        self.check()
    }

    async fn subscribe_app(&self, _creds: &Credentials) -> GraphResult<()> {
        self.check()
    }

    async fn unsubscribe_app(&self, _creds: &Credentials) -> GraphResult<()> {
        self.check()
    }

    async fn request_code(&self, _creds: &Credentials, _method: CodeMethod, _language: &str) -> GraphResult<()> {
        self.check()?;
        self.code_requests.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn verify_code(&self, _creds: &Credentials, code: &str) -> GraphResult<()> {
        self.check()?;
        if code == "000000" {
            return Err(GraphError::Api {
                status: 400,
                message: "The verification code you entered is incorrect.".into(),
            });
        }
        Ok(())
    }
}

/// Answers every request with the same reply.
pub struct MockAutoReply {
    reply: Option<String>,
    requests: Mutex<Vec<AutoReplyRequest>>,
}

impl MockAutoReply {
    pub fn requests(&self) -> Vec<AutoReplyRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutoReplyHook for MockAutoReply {
    async fn reply(&self, request: &AutoReplyRequest) -> GraphResult<Option<String>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.reply.clone())
    }
}

pub struct Harness {
    pub worker: WabizWorker,
    pub account: Account,
    pub provider: Arc<MockProvider>,
    pub auto_reply: Arc<MockAutoReply>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub async fn send_text(&self, to: &str, body: &str) -> SendOutcome {
        self.worker
            .send(
                "u1",
                SendTarget {
                    to: Some(to.into()),
                    ..Default::default()
                },
                Outgoing::Text {
                    body: body.into(),
                    preview_url: false,
                },
            )
            .await
            .unwrap()
    }

    pub async fn enable_auto_reply(&self) {
        self.worker
            .set_auto_reply(
                "u1",
                &self.account.id,
                AutoReplyConfig {
                    active: true,
                    prompt: Some("Be brief".into()),
                    webhook_url: Some("https://bot.example.test/reply".into()),
                },
            )
            .await
            .unwrap();
    }
}

pub fn settings() -> WorkerSettings {
    WorkerSettings {
        payment_secret: Some(PAYMENT_SECRET.into()),
        ..Default::default()
    }
}

pub async fn harness() -> Harness {
    build(settings(), None).await
}

pub async fn harness_with_reply(reply: Option<&str>) -> Harness {
    build(settings(), reply).await
}

pub async fn harness_with_settings(settings: WorkerSettings) -> Harness {
    build(settings, None).await
}

async fn build(settings: WorkerSettings, reply: Option<&str>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db = WabizDb::new_with_path(dir.path().join("test.db")).await.unwrap();
    let provider = Arc::new(MockProvider::default());
    let auto_reply = Arc::new(MockAutoReply {
        reply: reply.map(str::to_string),
        requests: Mutex::new(Vec::new()),
    });

    let worker = WabizWorker::new(
        db,
        provider.clone(),
        auto_reply.clone(),
        FieldCipher::new(&[7u8; 32]),
        settings,
    );

    let account = worker
        .create_account(
            "u1",
            AccountInput {
                name: Some("Main".into()),
                phone_number_id: "pn-1".into(),
                display_phone_number: Some("15550001111".into()),
                business_account_id: "waba-1".into(),
                access_token: "token-1".into(),
            },
        )
        .await
        .unwrap();

    Harness {
        worker,
        account,
        provider,
        auto_reply,
        _dir: dir,
    }
}
