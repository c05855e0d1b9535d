//! Transport Abstractions and Event-Driven Delivery
//!
//! A transport is a bidirectional channel of complete JSON-RPC messages
//! with an observable connection state. Inbound traffic is delivered
//! through a pre-configured [`MessageHandler`]; outbound traffic goes
//! through [`Transport::send`], optionally carrying [`SendOptions`] that
//! multi-stream transports use for response routing and resumption.
//!
//! # Design
//!
//! - **Event-driven**: callbacks instead of blocking `receive()` loops
//! - **Pre-configured handlers**: the handler is installed at build time,
//!   never swapped on a live transport
//! - **Weak back-reference for replies**: handlers reach the transport
//!   through a [`TransportSender`] holding a weak reference, so the
//!   transport-to-handler callback edge never forms an ownership cycle
//! - **Errors do not auto-close**: a transport reports faults through
//!   `handle_error` and keeps running; the session layer decides
//!
//! # Variants
//!
//! - [`stdio`]: newline-delimited JSON over stdin/stdout or a child
//!   process
//! - [`http`]: streamable HTTP with server-sent events and resumption
//! - [`inmemory`]: matched in-process pair for tests and embedded hosts

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

// Layer 3: Internal module imports
use crate::protocol::{JsonRpcMessage, RequestId};

pub mod buffer;
pub mod http;
pub mod inmemory;
pub mod stdio;

pub use buffer::ReadBuffer;

/// Observable connection state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection established
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Ready to carry traffic
    Connected,
    /// Failed; no further traffic possible
    Error,
}

/// Transport error types for comprehensive error handling
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection-related errors
    #[error("connection error: {message}")]
    Connection { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Message serialization/deserialization errors
    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Protocol-level errors (framing, envelope validation)
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// HTTP-level failure
    #[error("HTTP error: status {status}: {message}")]
    Http { status: u16, message: String },

    /// Send attempted on a transport that is not connected
    #[error("transport is closed")]
    Closed,

    /// Generic transport errors
    #[error("transport error: {message}")]
    Other { message: String },
}

impl TransportError {
    /// Convenience constructor for connection errors
    pub fn connection(message: impl Into<String>) -> Self {
        TransportError::Connection {
            message: message.into(),
        }
    }

    /// Convenience constructor for protocol errors
    pub fn protocol(message: impl Into<String>) -> Self {
        TransportError::Protocol {
            message: message.into(),
        }
    }
}

/// Session and metadata context delivered with each inbound message
#[derive(Debug, Clone)]
pub struct MessageContext {
    /// Session identifier, if the transport tracks one
    session_id: Option<String>,

    /// When the message was received
    timestamp: DateTime<Utc>,

    /// Additional transport metadata (remote address, user agent, ...)
    metadata: HashMap<String, String>,
}

impl MessageContext {
    /// Create a context carrying a session id
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Create a context for single-connection transports
    pub fn without_session() -> Self {
        Self {
            session_id: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Session id, if any
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Receive timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Read a metadata entry
    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Event-driven message handler
///
/// Separates transport concerns (delivery) from protocol concerns (MCP
/// semantics). The protocol engine implements this trait; transports call
/// it from their reader tasks, one message at a time per connection.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming JSON-RPC message
    async fn handle_message(&self, message: JsonRpcMessage, context: MessageContext);

    /// Handle a transport-level error that did not produce a message
    ///
    /// The transport keeps running after reporting; fatal conditions are
    /// signaled separately through `handle_close`.
    async fn handle_error(&self, error: TransportError);

    /// Handle transport closure (graceful or otherwise); called exactly once
    async fn handle_close(&self);
}

/// Callback invoked when a transport assigns a resumption token
pub type ResumptionTokenCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Per-send options consumed by multi-stream transports
///
/// Simple transports ignore all fields. The streamable HTTP server uses
/// `related_request_id` to pick the stream a response belongs to; the
/// streamable HTTP client uses the resumption fields to replay missed
/// traffic after a reconnect.
#[derive(Clone, Default)]
pub struct SendOptions {
    /// The inbound request this message answers or relates to
    pub related_request_id: Option<RequestId>,

    /// Resume delivery from this previously observed event id
    pub resumption_token: Option<String>,

    /// Invoked as the transport assigns event ids to delivered messages
    pub on_resumption_token: Option<ResumptionTokenCallback>,
}

impl SendOptions {
    /// Options relating a message to an inbound request
    pub fn related_to(request_id: RequestId) -> Self {
        Self {
            related_request_id: Some(request_id),
            ..Default::default()
        }
    }
}

impl fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendOptions")
            .field("related_request_id", &self.related_request_id)
            .field("resumption_token", &self.resumption_token)
            .field(
                "on_resumption_token",
                &self.on_resumption_token.as_ref().map(|_| "Fn"),
            )
            .finish()
    }
}

/// Transport trait: lifecycle plus message delivery
///
/// `send` returns when the transport has accepted the message for
/// delivery, not when the peer has processed it. `close` must invoke the
/// handler's `handle_close` exactly once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection and begin delivering inbound messages
    ///
    /// Fails if the transport was already started.
    async fn start(&mut self) -> Result<(), TransportError>;

    /// Deliver a message; may suspend on back-pressure
    ///
    /// Fails synchronously with [`TransportError::Closed`] when the
    /// transport is not connected.
    async fn send(
        &mut self,
        message: JsonRpcMessage,
        options: SendOptions,
    ) -> Result<(), TransportError>;

    /// Orderly shutdown; idempotent
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Session id, for session-tracking transports
    fn session_id(&self) -> Option<String> {
        None
    }

    /// Static identifier for logging ("stdio", "streamable-http", ...)
    fn transport_type(&self) -> &'static str;
}

/// A transport shared between its owning session and the reply path
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Weak sending handle used by the protocol engine
///
/// Created unbound, then bound once the transport exists. Holding only a
/// weak reference keeps the ownership graph acyclic: the session owns the
/// transport, the transport holds the engine's handler, and the handler
/// reaches back through this sender.
#[derive(Clone)]
pub struct TransportSender {
    inner: Arc<OnceLock<Weak<Mutex<Box<dyn Transport>>>>>,
}

impl TransportSender {
    /// Create a sender not yet attached to any transport
    pub fn unbound() -> Self {
        Self {
            inner: Arc::new(OnceLock::new()),
        }
    }

    /// Attach to a transport; later calls are ignored
    pub fn bind(&self, transport: &SharedTransport) {
        let _ = self.inner.set(Arc::downgrade(transport));
    }

    /// Send through the bound transport
    ///
    /// Sends are serialized by the transport mutex, preserving frame
    /// boundaries across concurrent callers.
    pub async fn send(
        &self,
        message: JsonRpcMessage,
        options: SendOptions,
    ) -> Result<(), TransportError> {
        let weak = self.inner.get().ok_or(TransportError::Closed)?;
        let shared = weak.upgrade().ok_or(TransportError::Closed)?;
        let mut transport = shared.lock().await;
        transport.send(message, options).await
    }
}

impl fmt::Debug for TransportSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSender")
            .field("bound", &self.inner.get().is_some())
            .finish()
    }
}

/// Builder trait for creating pre-configured transports
///
/// The message handler must be installed before the transport is built,
/// eliminating any window where a live transport has no handler.
pub trait TransportBuilder: Send {
    /// The transport type this builder creates
    type Transport: Transport + 'static;

    /// Install the message handler
    fn with_message_handler(self, handler: Arc<dyn MessageHandler>) -> Self;

    /// Build the configured transport, ready to start
    fn build(
        self,
    ) -> impl std::future::Future<Output = Result<Self::Transport, TransportError>> + Send;
}
