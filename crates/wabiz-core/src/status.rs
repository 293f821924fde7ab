use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::messages::UnknownVariant;

/// Delivery state of a stored message.
///
/// The success path is totally ordered by [`priority`]; `Failed` sits outside
/// that order and is only ever reached through an explicit failure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Received,
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Ordinal of a status on the success path. `None` for `Failed`.
pub fn priority(status: MessageStatus) -> Option<u8> {
    match status {
        MessageStatus::Received | MessageStatus::Pending => Some(0),
        MessageStatus::Sent => Some(1),
        MessageStatus::Delivered => Some(2),
        MessageStatus::Read => Some(3),
        MessageStatus::Failed => None,
    }
}

/// SQL mirror of [`priority`] over the `status` column, used by conditional updates.
pub const STATUS_PRIORITY_SQL: &str = "CASE status \
     WHEN 'received' THEN 0 \
     WHEN 'pending' THEN 0 \
     WHEN 'sent' THEN 1 \
     WHEN 'delivered' THEN 2 \
     WHEN 'read' THEN 3 \
     ELSE 99 END";

/// Whether `incoming` may replace `current`.
///
/// Nothing leaves `Failed` and `Failed` overrides everything else. On the
/// success path a higher ordinal wins, the same status re-applies, and anything
/// else is discarded, so `received` and `pending` never relabel each other.
pub fn can_advance(current: MessageStatus, incoming: MessageStatus) -> bool {
    if current == MessageStatus::Failed {
        return false;
    }
    match (priority(current), priority(incoming)) {
        (_, None) => true,
        (Some(cur), Some(new)) => new > cur || incoming == current,
        (None, Some(_)) => false,
    }
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Received => "received",
            MessageStatus::Pending => "pending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Read | MessageStatus::Failed)
    }

    /// Name of the timestamp column recording when this status was reached.
    pub fn timestamp_column(&self) -> Option<&'static str> {
        match self {
            MessageStatus::Sent => Some("sent_at"),
            MessageStatus::Delivered => Some("delivered_at"),
            MessageStatus::Read => Some("read_at"),
            MessageStatus::Failed => Some("failed_at"),
            MessageStatus::Received | MessageStatus::Pending => None,
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(MessageStatus::Received),
            "pending" => Ok(MessageStatus::Pending),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            other => Err(UnknownVariant::new("message status", other)),
        }
    }
}

impl TryFrom<String> for MessageStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
