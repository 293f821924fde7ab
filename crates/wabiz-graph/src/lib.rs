mod autoreply;
mod client;
mod error;
mod payload;
mod provider;

pub use autoreply::{AutoReplyHook, AutoReplyRequest, HttpAutoReply};
pub use client::{DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, GraphClient, GraphConfig};
pub use error::GraphError;
pub use payload::{MediaSource, OutboundBody, OutboundRequest};
pub use provider::{CodeMethod, Credentials, MediaInfo, MessagingProvider, SentMessage};
