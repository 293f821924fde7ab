mod chats;
mod contacts;
mod crypto;
mod error;
mod messages;
mod models;
mod repository;
mod schema;
mod tokens;
mod wallet;

pub use crypto::{FieldCipher, KEY_LEN, Sealed};
pub use error::DbError;
pub use models::*;
pub use repository::WabizDb;
pub use tokens::{TOKEN_PREFIX, hash_token};
