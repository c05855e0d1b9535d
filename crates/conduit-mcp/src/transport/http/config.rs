//! Streamable HTTP Configuration

// Layer 1: Standard library imports
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use uuid::Uuid;

// Layer 3: Internal module imports
use crate::protocol::constants::defaults;
use crate::transport::http::event_store::EventStore;

/// Generates session ids; return values should be globally unique and
/// hard to guess
pub type SessionIdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Server-side streamable HTTP configuration
#[derive(Clone)]
pub struct HttpServerConfig {
    /// Address to bind
    pub bind_addr: SocketAddr,

    /// Endpoint path serving POST/GET/DELETE
    pub path: String,

    /// Session id generator; `None` disables session management
    /// (stateless mode)
    pub session_id_generator: Option<SessionIdGenerator>,

    /// Answer POSTed requests with `application/json` bodies instead of
    /// opening an SSE stream
    pub enable_json_response: bool,

    /// Event store enabling `Last-Event-ID` resumption
    pub event_store: Option<Arc<dyn EventStore>>,
}

impl HttpServerConfig {
    /// Stateful config with UUID session ids on the default path
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            path: defaults::HTTP_PATH.to_string(),
            session_id_generator: Some(Arc::new(|| Uuid::new_v4().to_string())),
            enable_json_response: false,
            event_store: None,
        }
    }

    /// Disable session management
    pub fn stateless(mut self) -> Self {
        self.session_id_generator = None;
        self
    }

    /// Serve a custom endpoint path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Answer requests with single-shot JSON instead of SSE
    pub fn with_json_response(mut self) -> Self {
        self.enable_json_response = true;
        self
    }

    /// Enable resumability through an event store
    pub fn with_event_store(mut self, event_store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(event_store);
        self
    }
}

impl fmt::Debug for HttpServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("path", &self.path)
            .field("stateful", &self.session_id_generator.is_some())
            .field("enable_json_response", &self.enable_json_response)
            .field("resumable", &self.event_store.is_some())
            .finish()
    }
}

/// Client-side streamable HTTP configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Full endpoint URL, e.g. `http://127.0.0.1:8765/mcp`
    pub url: String,

    /// Open the standalone GET stream for server-initiated traffic once
    /// the session reaches operation
    pub open_standalone_stream: bool,
}

impl HttpClientConfig {
    /// Config for an endpoint URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            open_standalone_stream: true,
        }
    }

    /// Do not open the standalone GET stream
    pub fn without_standalone_stream(mut self) -> Self {
        self.open_standalone_stream = false;
        self
    }
}
