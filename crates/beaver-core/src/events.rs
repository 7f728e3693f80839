//! Session events and the event bus that carries them to UI consumers.
//!
//! A thread session publishes a [`SessionEvent`] whenever derived state the
//! sidebar renders has changed. Each event is wrapped in an
//! [`EventEnvelope`] carrying a time-ordered ID and timestamp. Components
//! subscribe independently; events emitted with no subscribers are dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Change notification from a thread session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A thread finished loading from history.
    ThreadLoaded {
        thread_id: String,
        message_count: usize,
        citation_count: usize,
    },
    /// The resolved citation list was rebuilt.
    CitationsUpdated {
        thread_id: String,
        citation_count: usize,
    },
    /// The aggregated "N sources" list changed.
    SourcesUpdated {
        thread_id: String,
        source_count: usize,
    },
    /// Sources were attached to a sent message.
    ThreadSourcesUpdated {
        thread_id: String,
        message_id: String,
        source_count: usize,
    },
    /// A streaming message was canceled by the user.
    MessageCanceled {
        thread_id: String,
        message_id: String,
    },
}

impl SessionEvent {
    /// Dot-namespaced event type, e.g. `"citations.updated"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ThreadLoaded { .. } => "thread.loaded",
            Self::CitationsUpdated { .. } => "citations.updated",
            Self::SourcesUpdated { .. } => "sources.updated",
            Self::ThreadSourcesUpdated { .. } => "thread_sources.updated",
            Self::MessageCanceled { .. } => "message.canceled",
        }
    }

    pub fn thread_id(&self) -> &str {
        match self {
            Self::ThreadLoaded { thread_id, .. }
            | Self::CitationsUpdated { thread_id, .. }
            | Self::SourcesUpdated { thread_id, .. }
            | Self::ThreadSourcesUpdated { thread_id, .. }
            | Self::MessageCanceled { thread_id, .. } => thread_id,
        }
    }
}

/// Envelope around a [`SessionEvent`].
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: SessionEvent,
}

impl EventEnvelope {
    pub fn new(event: SessionEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            occurred_at: Utc::now(),
            payload: event,
        }
    }
}

/// Broadcast bus for session events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SessionEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::trace!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive enveloped events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(SessionEvent::CitationsUpdated {
            thread_id: "t1".to_string(),
            citation_count: 3,
        });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.event_type, "citations.updated");
        assert_eq!(envelope.payload.thread_id(), "t1");
        assert!(matches!(
            envelope.payload,
            SessionEvent::CitationsUpdated {
                citation_count: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(SessionEvent::MessageCanceled {
            thread_id: "t1".to_string(),
            message_id: "m1".to_string(),
        });

        assert_eq!(rx1.recv().await.unwrap().event_type, "message.canceled");
        assert_eq!(rx2.recv().await.unwrap().event_type, "message.canceled");
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit(SessionEvent::SourcesUpdated {
            thread_id: "t1".to_string(),
            source_count: 0,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_session_event_serialization() {
        let event = SessionEvent::ThreadLoaded {
            thread_id: "t1".to_string(),
            message_count: 4,
            citation_count: 2,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "thread_loaded");
        assert_eq!(value["message_count"], 4);
    }
}
