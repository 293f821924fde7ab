use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use wabiz_core::{ChatType, Direction, MessageKind, MessageStatus, Participant, UnknownVariant};

use crate::crypto::Sealed;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub phone_number_id: String,
    pub display_phone_number: Option<String>,
    #[serde(skip_serializing)]
    pub business_account_id: Sealed,
    #[serde(skip_serializing)]
    pub access_token: Sealed,
    pub is_default: bool,
    pub phone_registered: bool,
    pub app_subscribed: bool,
    pub phone_verified: bool,
    pub code_requested_at: Option<i64>,
    pub blocked_numbers: Json<Vec<String>>,
    pub ai_active: bool,
    pub ai_prompt: Option<String>,
    pub ai_webhook_url: Option<String>,
    pub disabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    pub fn is_blocked(&self, number: &str) -> bool {
        let number = wabiz_core::phone::normalize_phone(number);
        self.blocked_numbers.iter().any(|b| *b == number)
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: String,
    pub name: Option<String>,
    pub phone_number_id: String,
    pub display_phone_number: Option<String>,
    pub business_account_id: Sealed,
    pub access_token: Sealed,
}

/// Setup flags flipped by the Graph account-setup calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupFlag {
    PhoneRegistered,
    AppSubscribed,
    PhoneVerified,
}

impl SetupFlag {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            SetupFlag::PhoneRegistered => "phone_registered",
            SetupFlag::AppSubscribed => "app_subscribed",
            SetupFlag::PhoneVerified => "phone_verified",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub participants: Json<Vec<Participant>>,
    #[sqlx(try_from = "String")]
    pub chat_type: ChatType,
    pub primary_number: Option<String>,
    pub name: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread_count: i64,
    pub is_favourite: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub chat_id: String,
    #[sqlx(try_from = "String")]
    pub direction: Direction,
    pub from_number: String,
    pub to_number: String,
    pub body: Option<String>,
    pub media_id: Option<String>,
    pub media_url: Option<String>,
    pub filename: Option<String>,
    #[sqlx(try_from = "String")]
    pub kind: MessageKind,
    pub tag: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    pub participants: Json<Vec<Participant>>,
    pub context_message_id: Option<String>,
    pub context_body: Option<String>,
    pub sent_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub read_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// What the provider said about an outbound send, recorded with the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundState {
    Sent { provider_message_id: Option<String> },
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct NewOutboundMessage {
    pub user_id: String,
    pub account_id: String,
    pub chat_id: String,
    pub from_number: String,
    pub to_number: String,
    pub body: Option<String>,
    pub media_id: Option<String>,
    pub media_url: Option<String>,
    pub filename: Option<String>,
    pub kind: MessageKind,
    pub tag: Option<String>,
    pub participants: Vec<Participant>,
    pub context_message_id: Option<String>,
    pub state: OutboundState,
}

#[derive(Debug, Clone)]
pub struct NewInboundMessage {
    pub user_id: String,
    pub account_id: String,
    pub chat_id: String,
    pub from_number: String,
    pub to_number: String,
    pub body: Option<String>,
    pub media_id: Option<String>,
    pub filename: Option<String>,
    pub kind: MessageKind,
    pub provider_message_id: String,
    pub participants: Vec<Participant>,
    pub context_message_id: Option<String>,
    pub timestamp: i64,
}

/// Result of offering a delivery status to a stored message.
#[derive(Debug, Clone)]
pub enum StatusOutcome {
    Applied(Message),
    /// The stored status ranks higher, or is `failed`.
    Stale { current: MessageStatus },
    /// No message carries this provider id.
    Unknown,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Contact {
    pub id: String,
    pub user_id: String,
    pub phone_number: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub email: Option<String>,
    pub tags: Json<Vec<String>>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInput {
    pub phone_number: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Wallet {
    pub user_id: String,
    pub balance: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit => "credit",
            TransactionKind::Debit => "debit",
        }
    }
}

impl TryFrom<String> for TransactionKind {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "credit" => Ok(TransactionKind::Credit),
            "debit" => Ok(TransactionKind::Debit),
            _ => Err(UnknownVariant::new("transaction kind", &value)),
        }
    }
}

/// Lifecycle of a wallet transaction: `pending -> processing -> success | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for TransactionStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(UnknownVariant::new("transaction status", &value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub amount: i64,
    #[sqlx(try_from = "String")]
    pub kind: TransactionKind,
    #[sqlx(try_from = "String")]
    pub status: TransactionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    Completed {
        transaction: WalletTransaction,
        wallet: Wallet,
    },
    /// The order already left `pending`; nothing was credited.
    AlreadyHandled(WalletTransaction),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ApiToken {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub prefix: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub last_used_at: Option<i64>,
    pub created_at: i64,
}
