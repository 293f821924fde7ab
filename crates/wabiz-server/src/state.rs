use std::sync::Arc;

use wabiz_worker::WabizWorker;

/// Webhook handshake and signing secrets.
#[derive(Debug, Clone, Default)]
pub struct WebhookSecrets {
    pub verify_token: Option<String>,
    pub app_secret: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub worker: WabizWorker,
    pub webhook: Arc<WebhookSecrets>,
}

impl AppState {
    pub fn new(worker: WabizWorker, webhook: WebhookSecrets) -> Self {
        Self {
            worker,
            webhook: Arc::new(webhook),
        }
    }
}
