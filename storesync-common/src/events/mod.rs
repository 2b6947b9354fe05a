//! Event types for the storesync event system
//!
//! Provides shared event definitions and the EventBus used to fan progress
//! mutations out to SSE subscribers.

mod progress_types;

pub use progress_types::{ProgressRecord, ProgressUpdate, SyncPhase};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// storesync event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A session's progress record was written
    ///
    /// Triggers:
    /// - SSE: Push the new snapshot to subscribers of this session
    ProgressUpdated {
        /// Import session id
        session_id: String,
        /// Full record after the merge
        progress: ProgressRecord,
    },

    /// A session was evicted by the garbage collector
    SessionEvicted {
        /// Import session id
        session_id: String,
        /// Whether the evicted session had completed
        completed: bool,
        /// When the session was evicted
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            SyncEvent::ProgressUpdated { .. } => "ProgressUpdated",
            SyncEvent::SessionEvicted { .. } => "SessionEvicted",
        }
    }

    /// Session this event refers to
    pub fn session_id(&self) -> &str {
        match self {
            SyncEvent::ProgressUpdated { session_id, .. }
            | SyncEvent::SessionEvicted { session_id, .. } => session_id,
        }
    }
}

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use storesync_common::events::{EventBus, ProgressRecord, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(SyncEvent::ProgressUpdated {
///     session_id: "abc".to_string(),
///     progress: ProgressRecord::waiting(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().session_id(), "abc");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers
    ///   start losing the oldest ones
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress updates use this: a run with nobody watching is normal.
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_event(session_id: &str, created: usize) -> SyncEvent {
        SyncEvent::ProgressUpdated {
            session_id: session_id.to_string(),
            progress: ProgressRecord {
                created,
                ..ProgressRecord::default()
            },
        }
    }

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        assert!(bus.emit(progress_event("s1", 1)).is_err());
        // lossy variant must not panic
        bus.emit_lossy(progress_event("s1", 1));
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(progress_event("s1", 1)).unwrap();
        bus.emit(progress_event("s1", 2)).unwrap();

        for rx in [&mut rx1, &mut rx2] {
            for expected in [1, 2] {
                match rx.recv().await.unwrap() {
                    SyncEvent::ProgressUpdated { progress, .. } => {
                        assert_eq!(progress.created, expected)
                    }
                    other => panic!("unexpected event {:?}", other),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.emit_lossy(progress_event("s1", i));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(progress_event("s9", 4)).unwrap();
        assert_eq!(json["type"], "ProgressUpdated");
        assert_eq!(json["session_id"], "s9");
        assert_eq!(json["progress"]["created"], 4);
        assert_eq!(progress_event("s9", 4).event_type(), "ProgressUpdated");
    }
}
