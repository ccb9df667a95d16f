//! Event bus for safety events
//!
//! Tokio broadcast channel; publishing never blocks and never fails the
//! pipeline, even with no subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::SafetyEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast bus for [`SafetyEvent`]s
pub struct EventBus {
    sender: broadcast::Sender<SafetyEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Returns how many received it.
    pub fn publish(&self, event: SafetyEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Safety event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Safety event published (no receivers)");
                0
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<SafetyEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by conversation ID
    pub conversation_id: Option<String>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(mut self, conversation_id: &str) -> Self {
        self.conversation_id = Some(conversation_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter
    pub fn matches(&self, event: &SafetyEvent) -> bool {
        if let Some(ref cid) = self.conversation_id {
            if event.conversation_id() != cid {
                return false;
            }
        }
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn unavailable(conversation_id: &str) -> SafetyEvent {
        SafetyEvent::ClassificationUnavailable {
            conversation_id: conversation_id.to_string(),
            message_id: "m".to_string(),
            reason: "timeout".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(unavailable("c1")), 0);
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.publish(unavailable("c1")), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "classification_unavailable");
    }

    #[test]
    fn test_filter_by_conversation_and_type() {
        let filter = EventFilter::new()
            .conversation("c1")
            .types(vec!["classification_unavailable"]);
        assert!(filter.matches(&unavailable("c1")));
        assert!(!filter.matches(&unavailable("c2")));

        let other_type = EventFilter::new().types(vec!["incident_recorded"]);
        assert!(!other_type.matches(&unavailable("c1")));
        assert!(EventFilter::new().matches(&unavailable("any")));
    }
}
