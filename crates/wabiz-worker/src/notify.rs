use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use wabiz_core::phone::user_topic;

use crate::events::PushEvent;

const TOPIC_CAPACITY: usize = 256;

/// Per-user publish/subscribe topics (`user-<id>`).
///
/// Publishing never fails: a topic with no subscribers drops the event, and a
/// subscriber that falls behind loses the oldest events.
#[derive(Clone, Default)]
pub struct Notifier {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<PushEvent>>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<PushEvent>>> {
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<PushEvent> {
        self.topics()
            .entry(user_topic(user_id))
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Returns how many live subscribers received the event.
    pub fn publish(&self, user_id: &str, event: PushEvent) -> usize {
        let topic = user_topic(user_id);
        let mut topics = self.topics();

        let Some(sender) = topics.get(&topic) else {
            tracing::trace!(%topic, event = event.name(), "No subscribers");
            return 0;
        };

        match sender.send(event) {
            Ok(count) => count,
            Err(_) => {
                topics.remove(&topic);
                0
            }
        }
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.topics()
            .get(&user_topic(user_id))
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}
