//! Event broadcaster for the record operation log.
//!
//! Uses tokio's broadcast channel so any number of subscribers can follow the
//! log without the publisher waiting on them.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::types::RecordEvent;

/// Events beyond this limit are dropped for slow receivers.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Cloneable handle to the ops-log bus.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<RecordEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn send(&self, event: RecordEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordEventType;

    #[test]
    fn test_no_subscribers() {
        let broadcaster = EventBroadcaster::new();
        assert!(!broadcaster.has_subscribers());
        assert_eq!(broadcaster.send(RecordEvent::created("k", "1")), 0);
    }

    #[tokio::test]
    async fn test_send_receive() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.send(RecordEvent::created("cachedloadbalanceracl", "abc"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.event_type, RecordEventType::Created);
        assert_eq!(ev.record_id, "abc");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let broadcaster = EventBroadcaster::new_shared();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.clone().subscribe();

        assert_eq!(broadcaster.send(RecordEvent::created("k", "1")), 2);
        assert_eq!(rx1.recv().await.unwrap().record_id, "1");
        assert_eq!(rx2.recv().await.unwrap().record_id, "1");
    }
}
