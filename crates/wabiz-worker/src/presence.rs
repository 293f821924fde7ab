use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Which chats each user currently has open.
///
/// Node-local: the registry lives in this process only and starts empty on
/// restart. A chat counts as open while at least one client holds it open.
#[derive(Clone, Default)]
pub struct Presence {
    open: Arc<Mutex<HashMap<String, HashMap<String, usize>>>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, user_id: &str, chat_id: &str) {
        let mut open = self.open.lock().unwrap_or_else(|p| p.into_inner());
        *open
            .entry(user_id.to_string())
            .or_default()
            .entry(chat_id.to_string())
            .or_insert(0) += 1;
    }

    pub fn close(&self, user_id: &str, chat_id: &str) {
        let mut open = self.open.lock().unwrap_or_else(|p| p.into_inner());
        let Some(chats) = open.get_mut(user_id) else {
            return;
        };
        if let Some(count) = chats.get_mut(chat_id) {
            *count -= 1;
            if *count == 0 {
                chats.remove(chat_id);
            }
        }
        if chats.is_empty() {
            open.remove(user_id);
        }
    }

    pub fn is_open(&self, user_id: &str, chat_id: &str) -> bool {
        self.open
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(user_id)
            .is_some_and(|chats| chats.contains_key(chat_id))
    }
}
