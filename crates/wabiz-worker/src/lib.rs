mod dispatcher;
mod error;
mod events;
mod inbound;
mod media;
mod notify;
mod presence;
mod reconciler;
mod resolver;
mod setup;
mod wallet;
mod worker;

#[cfg(test)]
mod test_support;

pub use dispatcher::{
    BroadcastReport, BroadcastTarget, Outgoing, RecipientResult, SendOutcome, SendTarget,
};
pub use error::{Result, WorkerError};
pub use events::PushEvent;
pub use media::MAX_MEDIA_BYTES;
pub use notify::Notifier;
pub use presence::Presence;
pub use resolver::ChatResolver;
pub use setup::{AccountInput, AutoReplyConfig};
pub use wallet::payment_signature_payload;
pub use worker::{WabizWorker, WorkerSettings};

pub use wabiz_db::{
    Account, ApiToken, Chat, Contact, ContactInput, Message, PaymentOutcome, StatusOutcome, Wallet,
    WalletTransaction,
};
