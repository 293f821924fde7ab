use thiserror::Error;
use wabiz_core::template::TemplateError;
use wabiz_core::webhook::WebhookError;
use wabiz_db::DbError;
use wabiz_graph::GraphError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Database error: {0}")]
    Db(DbError),

    #[error(transparent)]
    Provider(#[from] GraphError),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Insufficient credits: balance {balance}, required {required}")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error("Verification code already requested, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid webhook payload: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// The provider accepted the message but no local row could be written, so
    /// its status updates cannot be matched.
    #[error("Message was sent as {provider_message_id} but could not be recorded")]
    Unrecorded {
        provider_message_id: String,
        #[source]
        source: DbError,
    },
}

impl From<DbError> for WorkerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => WorkerError::NotFound(what),
            DbError::InsufficientCredits { balance, required } => {
                WorkerError::InsufficientCredits { balance, required }
            }
            DbError::InvalidAmount(amount) => {
                WorkerError::Validation(format!("Amount must be positive, got {amount}"))
            }
            DbError::Conflict(message) => WorkerError::Validation(message),
            other => WorkerError::Db(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
