//! Streamable HTTP Client Transport
//!
//! Sends every message as a `POST` with dual `Accept` (JSON and SSE) and
//! consumes whichever answer shape the server chooses. The session id
//! assigned on the initialize response is echoed on all later requests.
//! After the initialized notification the transport opens the standalone
//! GET stream for server-initiated traffic, reconnecting with
//! `Last-Event-ID` when an event store lets the server replay.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap as ReqwestHeaderMap, ACCEPT, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// Layer 3: Internal module imports
use crate::protocol::constants::notifications;
use crate::protocol::JsonRpcMessage;
use crate::transport::http::config::HttpClientConfig;
use crate::transport::http::server::{LAST_EVENT_ID_HEADER, MCP_SESSION_ID_HEADER};
use crate::transport::http::sse::SseParser;
use crate::transport::{
    ConnectionState, MessageContext, MessageHandler, SendOptions, Transport, TransportBuilder,
    TransportError,
};

const DUAL_ACCEPT: &str = "application/json, text/event-stream";

struct ClientShared {
    handler: Arc<dyn MessageHandler>,
    http: reqwest::Client,
    url: String,
    session_id: RwLock<Option<String>>,
    last_event_id: RwLock<Option<String>>,
}

impl ClientShared {
    fn base_headers(&self) -> ReqwestHeaderMap {
        let mut headers = ReqwestHeaderMap::new();
        if let Ok(guard) = self.session_id.read() {
            if let Some(session_id) = guard.as_ref() {
                if let Ok(value) = session_id.parse() {
                    headers.insert(MCP_SESSION_ID_HEADER, value);
                }
            }
        }
        headers
    }

    fn capture_session_id(&self, response: &reqwest::Response) {
        if let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut guard) = self.session_id.write() {
                if guard.as_deref() != Some(session_id) {
                    debug!(%session_id, "captured session id");
                    *guard = Some(session_id.to_string());
                }
            }
        }
    }

    fn remember_event_id(&self, event_id: &str, options: &SendOptions) {
        if let Ok(mut guard) = self.last_event_id.write() {
            *guard = Some(event_id.to_string());
        }
        if let Some(callback) = &options.on_resumption_token {
            callback(event_id.to_string());
        }
    }

    async fn dispatch(&self, message: JsonRpcMessage) {
        let context = match self.session_id.read().ok().and_then(|g| g.clone()) {
            Some(session_id) => MessageContext::new(session_id),
            None => MessageContext::without_session(),
        };
        self.handler.handle_message(message, context).await;
    }

    /// Drain an SSE body, dispatching each `message` event
    async fn consume_sse_body(
        self: Arc<Self>,
        response: reqwest::Response,
        options: SendOptions,
        guard: CancellationToken,
    ) {
        let mut stream = response.bytes_stream();
        let mut parser = SseParser::new();
        loop {
            let chunk = tokio::select! {
                _ = guard.cancelled() => break,
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    self.handler
                        .handle_error(TransportError::Connection {
                            message: format!("SSE stream error: {error}"),
                        })
                        .await;
                    break;
                }
            };
            for event in parser.feed(&String::from_utf8_lossy(&chunk)) {
                if let Some(event_id) = &event.id {
                    self.remember_event_id(event_id, &options);
                }
                if event.event != "message" || event.data.is_empty() {
                    continue;
                }
                match JsonRpcMessage::parse(&event.data) {
                    Ok(message) => self.dispatch(message).await,
                    Err(error) => {
                        self.handler
                            .handle_error(TransportError::protocol(error.to_string()))
                            .await;
                    }
                }
            }
        }
    }
}

/// Streamable HTTP client transport
pub struct HttpClientTransport {
    config: HttpClientConfig,
    message_handler: Option<Arc<dyn MessageHandler>>,
    shared: Option<Arc<ClientShared>>,
    lifecycle: CancellationToken,
    standalone_started: Arc<AtomicBool>,
    close_reported: Arc<AtomicBool>,
    is_running: bool,
}

impl HttpClientTransport {
    fn new(config: HttpClientConfig) -> Self {
        Self {
            config,
            message_handler: None,
            shared: None,
            lifecycle: CancellationToken::new(),
            standalone_started: Arc::new(AtomicBool::new(false)),
            close_reported: Arc::new(AtomicBool::new(false)),
            is_running: false,
        }
    }

    fn spawn_standalone_stream(&self, shared: Arc<ClientShared>) {
        if self.standalone_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let guard = self.lifecycle.clone();
        tokio::spawn(async move {
            loop {
                if guard.is_cancelled() {
                    break;
                }
                let mut request = shared
                    .http
                    .get(&shared.url)
                    .headers(shared.base_headers())
                    .header(ACCEPT, "text/event-stream");
                if let Some(last) = shared.last_event_id.read().ok().and_then(|g| g.clone()) {
                    request = request.header(LAST_EVENT_ID_HEADER, last);
                }

                match request.send().await {
                    Ok(response) if response.status().is_success() => {
                        shared.capture_session_id(&response);
                        Arc::clone(&shared)
                            .consume_sse_body(response, SendOptions::default(), guard.clone())
                            .await;
                    }
                    Ok(response) => {
                        // 405/404: server does not offer a standalone
                        // stream; do not retry.
                        debug!(status = %response.status(), "standalone GET not available");
                        break;
                    }
                    Err(error) => {
                        trace!(%error, "standalone GET failed, retrying");
                    }
                }

                tokio::select! {
                    _ = guard.cancelled() => break,
                    _ = tokio::time::sleep(std::time::Duration::from_millis(1000)) => {}
                }
            }
        });
    }
}

#[async_trait]
impl Transport for HttpClientTransport {
    async fn start(&mut self) -> Result<(), TransportError> {
        if self.is_running {
            return Err(TransportError::connection("transport already running"));
        }
        let handler = self
            .message_handler
            .as_ref()
            .ok_or_else(|| TransportError::connection("no message handler configured"))?
            .clone();

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Connection {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        self.shared = Some(Arc::new(ClientShared {
            handler,
            http,
            url: self.config.url.clone(),
            session_id: RwLock::new(None),
            last_event_id: RwLock::new(None),
        }));
        self.is_running = true;
        Ok(())
    }

    async fn send(
        &mut self,
        message: JsonRpcMessage,
        options: SendOptions,
    ) -> Result<(), TransportError> {
        if !self.is_running {
            return Err(TransportError::Closed);
        }
        let shared = self.shared.as_ref().ok_or(TransportError::Closed)?.clone();

        // A resumption token reattaches the SSE stream before new traffic
        // proceeds.
        if let Some(token) = &options.resumption_token {
            if let Ok(mut guard) = shared.last_event_id.write() {
                *guard = Some(token.clone());
            }
            self.standalone_started.store(false, Ordering::SeqCst);
            self.spawn_standalone_stream(Arc::clone(&shared));
        }

        let body = serde_json::to_vec(&message)?;
        let response = shared
            .http
            .post(&shared.url)
            .headers(shared.base_headers())
            .header(ACCEPT, DUAL_ACCEPT)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                message: format!("POST failed: {e}"),
            })?;

        shared.capture_session_id(&response);
        let status = response.status();
        if status.as_u16() == 202 {
            // Accepted with no body: notifications and responses.
            if message.method() == Some(notifications::INITIALIZED)
                && self.config.open_standalone_stream
            {
                self.spawn_standalone_stream(shared);
            }
            return Ok(());
        }
        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let guard = self.lifecycle.clone();
        if content_type.starts_with("text/event-stream") {
            tokio::spawn(async move {
                shared.consume_sse_body(response, options, guard).await;
            });
        } else if content_type.starts_with("application/json") {
            tokio::spawn(async move {
                match response.bytes().await {
                    Ok(bytes) => {
                        let parsed: Result<serde_json::Value, _> = serde_json::from_slice(&bytes);
                        match parsed {
                            Ok(serde_json::Value::Array(items)) => {
                                for item in items {
                                    match serde_json::from_value::<JsonRpcMessage>(item) {
                                        Ok(message) => shared.dispatch(message).await,
                                        Err(error) => {
                                            shared
                                                .handler
                                                .handle_error(TransportError::Serialization {
                                                    source: error,
                                                })
                                                .await
                                        }
                                    }
                                }
                            }
                            Ok(value) => match serde_json::from_value::<JsonRpcMessage>(value) {
                                Ok(message) => shared.dispatch(message).await,
                                Err(error) => {
                                    shared
                                        .handler
                                        .handle_error(TransportError::Serialization {
                                            source: error,
                                        })
                                        .await
                                }
                            },
                            Err(error) => {
                                shared
                                    .handler
                                    .handle_error(TransportError::Serialization { source: error })
                                    .await
                            }
                        }
                    }
                    Err(error) => {
                        shared
                            .handler
                            .handle_error(TransportError::Connection {
                                message: format!("failed to read response body: {error}"),
                            })
                            .await
                    }
                }
            });
        } else {
            warn!(%content_type, "unexpected response content type");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_running {
            return Ok(());
        }
        self.lifecycle.cancel();

        // Best-effort session termination.
        if let Some(shared) = &self.shared {
            if shared.session_id.read().ok().and_then(|g| g.clone()).is_some() {
                let request = shared.http.delete(&shared.url).headers(shared.base_headers());
                if let Err(error) = request.send().await {
                    trace!(%error, "DELETE on close failed");
                }
            }
        }

        self.is_running = false;
        if !self.close_reported.swap(true, Ordering::SeqCst) {
            if let Some(handler) = &self.message_handler {
                handler.handle_close().await;
            }
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        if self.is_running {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn session_id(&self) -> Option<String> {
        self.shared
            .as_ref()
            .and_then(|shared| shared.session_id.read().ok().and_then(|g| g.clone()))
    }

    fn transport_type(&self) -> &'static str {
        "streamable-http-client"
    }
}

/// Builder for the streamable HTTP client transport
pub struct HttpClientTransportBuilder {
    transport: HttpClientTransport,
}

impl HttpClientTransportBuilder {
    /// Builder from configuration
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            transport: HttpClientTransport::new(config),
        }
    }
}

impl TransportBuilder for HttpClientTransportBuilder {
    type Transport = HttpClientTransport;

    fn with_message_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.transport.message_handler = Some(handler);
        self
    }

    async fn build(self) -> Result<Self::Transport, TransportError> {
        if self.transport.message_handler.is_none() {
            return Err(TransportError::connection("no message handler configured"));
        }
        Ok(self.transport)
    }
}
