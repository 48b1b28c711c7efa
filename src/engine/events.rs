use serde_json::Value;
use tokio::sync::broadcast;

use crate::types::{AgentEvent, AgentEventType};

const EVENT_CAPACITY: usize = 256;

/// Fan-out of agent lifecycle events. Each subscriber gets its own
/// bounded queue; a subscriber that falls behind loses the oldest events
/// and sees a lag marker rather than stalling the publisher.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event_type: AgentEventType, data: Value) {
        // No subscribers is not an error.
        let _ = self.sender.send(AgentEvent::new(event_type, data));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribers_see_publication_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(AgentEventType::ToolStart, json!({"tool": "a"}));
        bus.publish(AgentEventType::ToolComplete, json!({"tool": "a"}));

        assert_eq!(rx.recv().await.unwrap().event_type, AgentEventType::ToolStart);
        assert_eq!(
            rx.recv().await.unwrap().event_type,
            AgentEventType::ToolComplete
        );
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(AgentEventType::Error, json!({"message": "x"}));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
