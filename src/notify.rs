use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::DocId;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

/// One document changed in a collection. Carries no document body — the
/// subscriber reloads the view; the event is only a wake-up signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: &'static str,
    pub id: DocId,
    pub kind: ChangeKind,
}

/// Broadcast hub for per-collection change feeds.
pub struct ChangeHub {
    channels: DashMap<&'static str, broadcast::Sender<ChangeEvent>>,
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes in a collection. Creates the channel if needed.
    pub fn subscribe(&self, collection: &'static str) -> broadcast::Receiver<ChangeEvent> {
        let sender = self
            .channels
            .entry(collection)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a change notification. No-op if nobody is listening.
    pub fn send(&self, event: ChangeEvent) {
        if let Some(sender) = self.channels.get(event.collection) {
            let _ = sender.send(event);
        }
    }
}
