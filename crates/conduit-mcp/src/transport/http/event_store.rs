//! Event Store for SSE Resumability
//!
//! When a store is configured, every message written to an SSE stream is
//! recorded against its stream id and assigned an event id. A client
//! reconnecting with `Last-Event-ID` replays events strictly after that
//! id. An unknown id replays nothing and is not an error.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::sync::mpsc;

// Layer 3: Internal module imports
use crate::protocol::JsonRpcMessage;
use crate::transport::TransportError;

/// Pluggable log of per-stream messages keyed by event id
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Record a message, returning its assigned event id
    async fn store_event(
        &self,
        stream_id: &str,
        message: &JsonRpcMessage,
    ) -> Result<String, TransportError>;

    /// Replay every event strictly after `last_event_id` onto `sink`
    ///
    /// Returns the id of the stream the events belonged to, or an empty
    /// string when the event id is unknown (nothing replayed).
    async fn replay_after(
        &self,
        last_event_id: &str,
        sink: mpsc::Sender<(String, JsonRpcMessage)>,
    ) -> Result<String, TransportError>;
}

#[derive(Debug, Clone)]
struct StoredEvent {
    event_id: String,
    stream_id: String,
    message: JsonRpcMessage,
}

/// In-process event store, suitable for tests and single-node servers
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<Vec<StoredEvent>>,
    counter: AtomicU64,
}

impl InMemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn store_event(
        &self,
        stream_id: &str,
        message: &JsonRpcMessage,
    ) -> Result<String, TransportError> {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let event_id = format!("{stream_id}_{sequence}");
        let mut events = self
            .events
            .lock()
            .map_err(|_| TransportError::Other {
                message: "event store lock poisoned".to_string(),
            })?;
        events.push(StoredEvent {
            event_id: event_id.clone(),
            stream_id: stream_id.to_string(),
            message: message.clone(),
        });
        Ok(event_id)
    }

    async fn replay_after(
        &self,
        last_event_id: &str,
        sink: mpsc::Sender<(String, JsonRpcMessage)>,
    ) -> Result<String, TransportError> {
        let replay: Vec<StoredEvent> = {
            let events = self
                .events
                .lock()
                .map_err(|_| TransportError::Other {
                    message: "event store lock poisoned".to_string(),
                })?;
            let Some(position) = events.iter().position(|e| e.event_id == last_event_id) else {
                return Ok(String::new());
            };
            let stream_id = events[position].stream_id.clone();
            events[position + 1..]
                .iter()
                .filter(|e| e.stream_id == stream_id)
                .cloned()
                .collect()
        };

        let stream_id = replay
            .first()
            .map(|e| e.stream_id.clone())
            .unwrap_or_else(|| {
                // Nothing after the id; still report which stream it was.
                self.events
                    .lock()
                    .ok()
                    .and_then(|events| {
                        events
                            .iter()
                            .find(|e| e.event_id == last_event_id)
                            .map(|e| e.stream_id.clone())
                    })
                    .unwrap_or_default()
            });

        for event in replay {
            if sink.send((event.event_id, event.message)).await.is_err() {
                break;
            }
        }
        Ok(stream_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonRpcNotification;

    fn note(method: &str) -> JsonRpcMessage {
        JsonRpcMessage::Notification(JsonRpcNotification::new(method, None))
    }

    #[tokio::test]
    async fn replays_events_strictly_after_the_id() {
        let store = InMemoryEventStore::new();
        let first = store.store_event("s1", &note("a")).await.unwrap();
        store.store_event("s1", &note("b")).await.unwrap();
        store.store_event("s2", &note("other-stream")).await.unwrap();
        store.store_event("s1", &note("c")).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let stream = store.replay_after(&first, tx).await.unwrap();
        assert_eq!(stream, "s1");

        let mut methods = Vec::new();
        while let Ok((_, message)) = rx.try_recv() {
            methods.push(message.method().unwrap().to_string());
        }
        assert_eq!(methods, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn unknown_id_replays_nothing_without_error() {
        let store = InMemoryEventStore::new();
        store.store_event("s1", &note("a")).await.unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let stream = store.replay_after("missing", tx).await.unwrap();
        assert!(stream.is_empty());
        assert!(rx.try_recv().is_err());
    }
}
