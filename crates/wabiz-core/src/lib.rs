mod chat;
mod messages;
mod protocol;
mod status;

pub mod phone;
pub mod signature;
pub mod template;
pub mod webhook;

pub use chat::*;
pub use messages::*;
pub use protocol::*;
pub use status::*;
