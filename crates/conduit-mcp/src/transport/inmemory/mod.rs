//! In-Memory Transport
//!
//! A matched pair of endpoints for tests and in-process hosts. A message
//! sent on one half is delivered to the other half's message handler in
//! send order; messages sent before the receiving half starts are queued
//! and drained on start. Closing one half closes the other.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

// Layer 3: Internal module imports
use crate::protocol::JsonRpcMessage;
use crate::transport::{
    ConnectionState, MessageContext, MessageHandler, SendOptions, Transport, TransportBuilder,
    TransportError,
};

const STATE_DISCONNECTED: u8 = 0;
const STATE_CONNECTED: u8 = 1;
const STATE_ERROR: u8 = 2;

/// One half of an in-process transport pair
///
/// # Examples
///
/// ```rust,no_run
/// use conduit_mcp::transport::inmemory::InMemoryTransport;
///
/// let (client_end, server_end) = InMemoryTransport::pair();
/// // hand each end to a session builder
/// ```
pub struct InMemoryTransport {
    handler: Option<Arc<dyn MessageHandler>>,
    outgoing: Option<mpsc::UnboundedSender<JsonRpcMessage>>,
    incoming: Option<mpsc::UnboundedReceiver<JsonRpcMessage>>,
    /// Set once either half has closed
    link_closed: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    close_reported: Arc<AtomicBool>,
    pump_guard: CancellationToken,
    pump: Option<tokio::task::JoinHandle<()>>,
    session_id: String,
}

impl InMemoryTransport {
    /// Create a connected pair of endpoints
    pub fn pair() -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::unbounded_channel();
        let (b_to_a_tx, b_to_a_rx) = mpsc::unbounded_channel();
        let link_closed = Arc::new(AtomicBool::new(false));

        let make = |outgoing, incoming, session_id: &str| InMemoryTransport {
            handler: None,
            outgoing: Some(outgoing),
            incoming: Some(incoming),
            link_closed: Arc::clone(&link_closed),
            state: Arc::new(AtomicU8::new(STATE_DISCONNECTED)),
            close_reported: Arc::new(AtomicBool::new(false)),
            pump_guard: CancellationToken::new(),
            pump: None,
            session_id: session_id.to_string(),
        };

        (
            make(a_to_b_tx, b_to_a_rx, "inmemory-client"),
            make(b_to_a_tx, a_to_b_rx, "inmemory-server"),
        )
    }

    async fn report_close(
        handler: &Arc<dyn MessageHandler>,
        close_reported: &AtomicBool,
    ) {
        if !close_reported.swap(true, Ordering::SeqCst) {
            handler.handle_close().await;
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn start(&mut self) -> Result<(), TransportError> {
        if self.state.load(Ordering::SeqCst) == STATE_CONNECTED {
            return Err(TransportError::connection("transport already started"));
        }
        let handler = self
            .handler
            .as_ref()
            .ok_or_else(|| TransportError::connection("no message handler configured"))?
            .clone();
        let mut incoming = self
            .incoming
            .take()
            .ok_or_else(|| TransportError::connection("transport already consumed"))?;

        self.state.store(STATE_CONNECTED, Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        let close_reported = Arc::clone(&self.close_reported);
        let guard = self.pump_guard.clone();
        let session_id = self.session_id.clone();

        self.pump = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = guard.cancelled() => break,
                    received = incoming.recv() => {
                        match received {
                            Some(message) => {
                                trace!(session = %session_id, "delivering in-memory message");
                                let context = MessageContext::new(session_id.clone());
                                handler.handle_message(message, context).await;
                            }
                            None => {
                                // Peer half dropped its sender: linked close.
                                state.store(STATE_DISCONNECTED, Ordering::SeqCst);
                                Self::report_close(&handler, &close_reported).await;
                                break;
                            }
                        }
                    }
                }
            }
        }));
        Ok(())
    }

    async fn send(
        &mut self,
        message: JsonRpcMessage,
        _options: SendOptions,
    ) -> Result<(), TransportError> {
        if self.link_closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let sender = self.outgoing.as_ref().ok_or(TransportError::Closed)?;
        sender.send(message).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.link_closed.store(true, Ordering::SeqCst);
        // Dropping the sender ends the peer's pump with a linked close.
        self.outgoing = None;
        self.pump_guard.cancel();
        if let Some(pump) = self.pump.take() {
            let _ = pump.await;
        }
        self.state.store(STATE_DISCONNECTED, Ordering::SeqCst);
        if let Some(handler) = &self.handler {
            Self::report_close(handler, &self.close_reported).await;
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::SeqCst) {
            STATE_CONNECTED => ConnectionState::Connected,
            STATE_ERROR => ConnectionState::Error,
            _ => ConnectionState::Disconnected,
        }
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }

    fn transport_type(&self) -> &'static str {
        "inmemory"
    }
}

impl TransportBuilder for InMemoryTransport {
    type Transport = InMemoryTransport;

    fn with_message_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    async fn build(self) -> Result<Self::Transport, TransportError> {
        if self.handler.is_none() {
            return Err(TransportError::connection("no message handler configured"));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonRpcNotification;
    use std::sync::Mutex;

    struct Recorder {
        messages: Arc<Mutex<Vec<JsonRpcMessage>>>,
        closes: Arc<AtomicBool>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle_message(&self, message: JsonRpcMessage, _context: MessageContext) {
            self.messages.lock().unwrap().push(message);
        }
        async fn handle_error(&self, _error: TransportError) {}
        async fn handle_close(&self) {
            self.closes.store(true, Ordering::SeqCst);
        }
    }

    fn recorder() -> (Arc<Recorder>, Arc<Mutex<Vec<JsonRpcMessage>>>, Arc<AtomicBool>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::new(AtomicBool::new(false));
        (
            Arc::new(Recorder {
                messages: Arc::clone(&messages),
                closes: Arc::clone(&closes),
            }),
            messages,
            closes,
        )
    }

    fn note(method: &str) -> JsonRpcMessage {
        JsonRpcMessage::Notification(JsonRpcNotification::new(method, None))
    }

    #[tokio::test]
    async fn delivers_in_send_order() {
        let (left, right) = InMemoryTransport::pair();
        let (handler, messages, _) = recorder();
        let mut right = right.with_message_handler(handler).build().await.unwrap();
        right.start().await.unwrap();

        let (noop_handler, _, _) = recorder();
        let mut left = left.with_message_handler(noop_handler).build().await.unwrap();
        left.start().await.unwrap();

        for method in ["one", "two", "three"] {
            left.send(note(method), SendOptions::default()).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let seen = messages.lock().unwrap();
        let methods: Vec<_> = seen.iter().filter_map(|m| m.method()).collect();
        assert_eq!(methods, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn queues_messages_sent_before_start() {
        let (left, right) = InMemoryTransport::pair();
        let (noop_handler, _, _) = recorder();
        let mut left = left.with_message_handler(noop_handler).build().await.unwrap();
        left.start().await.unwrap();
        left.send(note("early"), SendOptions::default()).await.unwrap();

        let (handler, messages, _) = recorder();
        let mut right = right.with_message_handler(handler).build().await.unwrap();
        right.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closing_one_half_closes_the_other() {
        let (left, right) = InMemoryTransport::pair();
        let (left_handler, _, _) = recorder();
        let (right_handler, _, right_closed) = recorder();

        let mut left = left.with_message_handler(left_handler).build().await.unwrap();
        let mut right = right.with_message_handler(right_handler).build().await.unwrap();
        left.start().await.unwrap();
        right.start().await.unwrap();

        left.close().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(right_closed.load(Ordering::SeqCst));
        assert!(matches!(
            right.send(note("late"), SendOptions::default()).await,
            Err(TransportError::Closed)
        ));
    }
}
