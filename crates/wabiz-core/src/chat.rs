use serde::{Deserialize, Serialize};

use crate::messages::UnknownVariant;
use crate::phone::normalize_phone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Single,
    Broadcast,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Single => "single",
            ChatType::Broadcast => "broadcast",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(ChatType::Single),
            "broadcast" => Some(ChatType::Broadcast),
            _ => None,
        }
    }
}

impl TryFrom<String> for ChatType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ChatType::parse(&value).ok_or_else(|| UnknownVariant::new("chat type", &value))
    }
}

/// Denormalized counterparty record kept on a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Participant {
    pub fn new(number: &str) -> Self {
        Self {
            number: normalize_phone(number),
            name: None,
            image: None,
        }
    }
}
