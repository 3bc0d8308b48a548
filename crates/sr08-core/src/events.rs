//! Application event system.
//!
//! The engine pushes `{type, payload}` tuples to the UI layer: live metric
//! updates, connection-state changes, low-battery notices, and cycle
//! results. Events are serializable so the host application can forward
//! them over an IPC channel unchanged.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use sr08_types::HealthRecord;

use crate::transport::ConnectionState;

/// Events emitted by the collection engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum AppEvent {
    /// A metric value arrived from the ring.
    Metric { name: String, value: i64 },
    /// The link changed state.
    Connection { state: ConnectionState },
    /// The ring reported a critically low battery.
    BatteryLow,
    /// One raw entry from the ring's periodic health log (GET87), forwarded
    /// verbatim for the host application to interpret.
    HealthLogEntry { entry: String },
    /// A collection cycle finalized a record.
    CycleCompleted { record: HealthRecord },
    /// A collection cycle aborted before producing a record.
    CycleAborted { reason: String },
}

/// Sender for application events.
pub type EventSender = broadcast::Sender<AppEvent>;

/// Receiver for application events.
pub type EventReceiver = broadcast::Receiver<AppEvent>;

/// Event dispatcher for fanning events out to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: AppEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatch_and_receive() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx = dispatcher.subscribe();

        dispatcher.send(AppEvent::Metric {
            name: "heartRate".to_string(),
            value: 72,
        });

        match rx.recv().await.unwrap() {
            AppEvent::Metric { name, value } => {
                assert_eq!(name, "heartRate");
                assert_eq!(value, 72);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_send_without_receivers_does_not_panic() {
        let dispatcher = EventDispatcher::new(8);
        dispatcher.send(AppEvent::BatteryLow);
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = AppEvent::Metric {
            name: "spo2".to_string(),
            value: 97,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "metric");
        assert_eq!(json["name"], "spo2");
        assert_eq!(json["value"], 97);
    }
}
