use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed events, keyed by room id. An embedding UI
/// subscribes to the rooms it renders and refreshes on receipt.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening on that room.
    pub fn send(&self, room_id: &str, event: &Event) {
        if let Some(sender) = self.channels.get(room_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a room's channel once nothing will publish to it again.
    pub fn remove(&self, room_id: &str) {
        self.channels.remove(room_id);
    }
}
