//! Streamable HTTP Server Transport
//!
//! One MCP session served over three endpoints on a configurable path:
//!
//! - `POST` accepts a JSON-RPC message or batch. Bodies containing
//!   requests are answered with an SSE stream (default) or a single JSON
//!   body; notification/response-only bodies return `202 Accepted`.
//! - `GET` opens the standalone SSE stream for server-initiated traffic;
//!   only one per session, a second request gets `409 Conflict`.
//! - `DELETE` terminates the session.
//!
//! In stateful mode the session id is assigned while answering the
//! `initialize` request and must be echoed by the client in the
//! `Mcp-Session-Id` header (missing: 400, mismatch: 404). With an event
//! store configured, SSE messages get event ids and `Last-Event-ID`
//! replays everything strictly after the given id.

// Layer 1: Standard library imports
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

// Layer 3: Internal module imports
use crate::protocol::constants::{error_codes, methods};
use crate::protocol::{JsonRpcError, JsonRpcMessage, JsonRpcResponse};
use crate::transport::http::config::{HttpServerConfig, SessionIdGenerator};
use crate::transport::http::event_store::EventStore;
use crate::transport::{
    ConnectionState, MessageContext, MessageHandler, SendOptions, Transport, TransportBuilder,
    TransportError,
};

/// Session-correlation header
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
/// SSE resumption header
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

const STANDALONE_STREAM_ID: &str = "standalone";

struct OutboundFrame {
    event_id: Option<String>,
    message: JsonRpcMessage,
}

/// Channel backing one POST's response stream (SSE or JSON collector)
struct PostChannel {
    tx: mpsc::Sender<OutboundFrame>,
    remaining: AtomicUsize,
    stream_id: String,
}

struct StandaloneStream {
    tx: mpsc::Sender<OutboundFrame>,
}

struct ServerState {
    handler: Arc<dyn MessageHandler>,
    session_id_generator: Option<SessionIdGenerator>,
    enable_json_response: bool,
    event_store: Option<Arc<dyn EventStore>>,

    session_id: RwLock<Option<String>>,
    /// Response routing by request id
    request_streams: DashMap<String, Arc<PostChannel>>,
    /// The single server-initiated stream opened by GET
    standalone: tokio::sync::Mutex<Option<StandaloneStream>>,
    terminated: AtomicBool,
}

impl ServerState {
    fn current_session(&self) -> Option<String> {
        self.session_id.read().ok().and_then(|guard| guard.clone())
    }

    /// Validate the session header on a non-initialize request
    fn check_session(&self, headers: &HeaderMap) -> Result<(), Response> {
        if self.session_id_generator.is_none() {
            return Ok(());
        }
        let presented = headers
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok());
        let Some(presented) = presented else {
            return Err(plain_response(
                StatusCode::BAD_REQUEST,
                "missing Mcp-Session-Id header",
            ));
        };
        if self.current_session().as_deref() != Some(presented) {
            return Err(plain_response(StatusCode::NOT_FOUND, "unknown session"));
        }
        Ok(())
    }

    fn message_context(&self) -> MessageContext {
        match self.current_session() {
            Some(session_id) => MessageContext::new(session_id),
            None => MessageContext::without_session(),
        }
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}

fn json_rpc_error_response(status: StatusCode, code: i32, message: &str) -> Response {
    let body = JsonRpcResponse::error(JsonRpcError::new(code, message, None), None);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::to_string(&body).unwrap_or_default(),
    )
        .into_response()
}

fn frame_to_event(frame: OutboundFrame) -> Event {
    let data = serde_json::to_string(&frame.message).unwrap_or_default();
    let event = Event::default().event("message").data(data);
    match frame.event_id {
        Some(id) => event.id(id),
        None => event,
    }
}

fn is_initialize_request(message: &JsonRpcMessage) -> bool {
    matches!(message, JsonRpcMessage::Request(request) if request.method == methods::INITIALIZE)
}

async fn handle_post(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.terminated.load(Ordering::SeqCst) {
        return plain_response(StatusCode::NOT_FOUND, "session terminated");
    }

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !(accept.contains("application/json") && accept.contains("text/event-stream")) {
        return plain_response(
            StatusCode::NOT_ACCEPTABLE,
            "Accept must include application/json and text/event-stream",
        );
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("application/json") {
        return plain_response(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/json",
        );
    }

    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(error) => {
            return json_rpc_error_response(
                StatusCode::BAD_REQUEST,
                error_codes::PARSE_ERROR,
                &format!("parse error: {error}"),
            )
        }
    };
    let was_batch = parsed.is_array();
    let raw_messages = match parsed {
        Value::Array(items) if items.is_empty() => {
            return json_rpc_error_response(
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_REQUEST,
                "empty batch",
            )
        }
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut messages = Vec::with_capacity(raw_messages.len());
    for raw in raw_messages {
        let message: JsonRpcMessage = match serde_json::from_value(raw) {
            Ok(message) => message,
            Err(error) => {
                return json_rpc_error_response(
                    StatusCode::BAD_REQUEST,
                    error_codes::PARSE_ERROR,
                    &format!("parse error: {error}"),
                )
            }
        };
        if let Err(error) = message.validate() {
            return json_rpc_error_response(
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_REQUEST,
                &error.to_string(),
            );
        }
        messages.push(message);
    }

    // Session management: initialize assigns the id, everything else
    // must present it.
    if let Some(generator) = &state.session_id_generator {
        if messages.iter().any(is_initialize_request) {
            if let Ok(mut guard) = state.session_id.write() {
                if guard.is_none() {
                    let session_id = generator();
                    debug!(%session_id, "session initialized");
                    *guard = Some(session_id);
                }
            }
        } else if let Err(response) = state.check_session(&headers) {
            return response;
        }
    }

    let context = state.message_context();
    let request_count = messages
        .iter()
        .filter(|m| matches!(m, JsonRpcMessage::Request(_)))
        .count();

    if request_count == 0 {
        for message in messages {
            state.handler.handle_message(message, context.clone()).await;
        }
        return with_session_header(StatusCode::ACCEPTED.into_response(), &state);
    }

    let (tx, rx) = mpsc::channel(64);
    let channel = Arc::new(PostChannel {
        tx,
        remaining: AtomicUsize::new(request_count),
        stream_id: Uuid::new_v4().to_string(),
    });
    for message in &messages {
        if let JsonRpcMessage::Request(request) = message {
            state
                .request_streams
                .insert(request.id.to_string(), Arc::clone(&channel));
        }
    }
    drop(channel);

    for message in messages {
        state.handler.handle_message(message, context.clone()).await;
    }

    if state.enable_json_response {
        let mut rx = rx;
        let mut responses = Vec::with_capacity(request_count);
        while responses.len() < request_count {
            match rx.recv().await {
                Some(frame) => {
                    if matches!(frame.message, JsonRpcMessage::Response(_)) {
                        responses.push(frame.message);
                    }
                }
                None => break,
            }
        }
        let body = if was_batch {
            serde_json::to_string(&responses)
        } else {
            serde_json::to_string(&responses.first())
        };
        let response = (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body.unwrap_or_default(),
        )
            .into_response();
        with_session_header(response, &state)
    } else {
        let stream =
            ReceiverStream::new(rx).map(|frame| Ok::<Event, Infallible>(frame_to_event(frame)));
        let response = Sse::new(stream)
            .keep_alive(KeepAlive::default())
            .into_response();
        with_session_header(response, &state)
    }
}

async fn handle_get(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if state.terminated.load(Ordering::SeqCst) {
        return plain_response(StatusCode::NOT_FOUND, "session terminated");
    }
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !accept.contains("text/event-stream") {
        return plain_response(
            StatusCode::NOT_ACCEPTABLE,
            "Accept must include text/event-stream",
        );
    }
    if let Err(response) = state.check_session(&headers) {
        return response;
    }

    let mut slot = state.standalone.lock().await;
    if slot.is_some() {
        return plain_response(
            StatusCode::CONFLICT,
            "standalone SSE stream already established",
        );
    }
    let (tx, rx) = mpsc::channel(64);
    *slot = Some(StandaloneStream { tx: tx.clone() });
    drop(slot);

    // Resumption: replay stored events strictly after Last-Event-ID onto
    // the fresh stream. An unknown id replays nothing.
    let last_event_id = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let (Some(event_store), Some(last_event_id)) = (state.event_store.clone(), last_event_id) {
        tokio::spawn(async move {
            let (replay_tx, mut replay_rx) = mpsc::channel(64);
            let forward = async {
                while let Some((event_id, message)) = replay_rx.recv().await {
                    let frame = OutboundFrame {
                        event_id: Some(event_id),
                        message,
                    };
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                }
            };
            let (replayed, ()) = tokio::join!(event_store.replay_after(&last_event_id, replay_tx), forward);
            if let Err(error) = replayed {
                warn!(%error, "event replay failed");
            }
        });
    }

    let stream =
        ReceiverStream::new(rx).map(|frame| Ok::<Event, Infallible>(frame_to_event(frame)));
    let response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    with_session_header(response, &state)
}

async fn handle_delete(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if state.terminated.load(Ordering::SeqCst) {
        return plain_response(StatusCode::NOT_FOUND, "session terminated");
    }
    if let Err(response) = state.check_session(&headers) {
        return response;
    }

    debug!("session terminated by DELETE");
    state.terminated.store(true, Ordering::SeqCst);
    state.request_streams.clear();
    *state.standalone.lock().await = None;
    state.handler.handle_close().await;
    StatusCode::OK.into_response()
}

fn with_session_header(mut response: Response, state: &ServerState) -> Response {
    if let Some(session_id) = state.current_session() {
        if let Ok(value) = session_id.parse() {
            response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
        }
    }
    response
}

/// Streamable HTTP server transport for one MCP session
pub struct HttpServerTransport {
    config: HttpServerConfig,
    message_handler: Option<Arc<dyn MessageHandler>>,
    state: Option<Arc<ServerState>>,
    shutdown: CancellationToken,
    serve_task: Option<tokio::task::JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    close_reported: Arc<AtomicBool>,
    is_running: bool,
}

impl HttpServerTransport {
    /// Create a transport from configuration; handler comes from the
    /// builder
    fn new(config: HttpServerConfig) -> Self {
        Self {
            config,
            message_handler: None,
            state: None,
            shutdown: CancellationToken::new(),
            serve_task: None,
            local_addr: None,
            close_reported: Arc::new(AtomicBool::new(false)),
            is_running: false,
        }
    }

    /// The actually bound address (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

#[async_trait]
impl Transport for HttpServerTransport {
    async fn start(&mut self) -> Result<(), TransportError> {
        if self.is_running {
            return Err(TransportError::connection("transport already running"));
        }
        let handler = self
            .message_handler
            .as_ref()
            .ok_or_else(|| TransportError::connection("no message handler configured"))?
            .clone();

        let state = Arc::new(ServerState {
            handler,
            session_id_generator: self.config.session_id_generator.clone(),
            enable_json_response: self.config.enable_json_response,
            event_store: self.config.event_store.clone(),
            session_id: RwLock::new(None),
            request_streams: DashMap::new(),
            standalone: tokio::sync::Mutex::new(None),
            terminated: AtomicBool::new(false),
        });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any);
        let router = Router::new()
            .route(
                &self.config.path,
                post(handle_post).get(handle_get).delete(handle_delete),
            )
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.local_addr = listener.local_addr().ok();
        debug!(addr = ?self.local_addr, path = %self.config.path, "streamable HTTP server listening");

        let shutdown = self.shutdown.clone();
        self.serve_task = Some(tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(error) = serve.await {
                warn!(%error, "HTTP server terminated abnormally");
            }
        }));

        self.state = Some(state);
        self.is_running = true;
        Ok(())
    }

    async fn send(
        &mut self,
        message: JsonRpcMessage,
        options: SendOptions,
    ) -> Result<(), TransportError> {
        let state = self.state.as_ref().ok_or(TransportError::Closed)?;
        if !self.is_running || state.terminated.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        // Responses route by their own id; related traffic (progress,
        // server-initiated requests belonging to an inbound request) by
        // the related id.
        let route_key = match &message {
            JsonRpcMessage::Response(response) => response
                .id
                .as_ref()
                .map(|id| id.to_string())
                .or_else(|| options.related_request_id.as_ref().map(|id| id.to_string())),
            _ => options.related_request_id.as_ref().map(|id| id.to_string()),
        };

        if let Some(key) = route_key {
            let channel = state
                .request_streams
                .get(&key)
                .map(|entry| Arc::clone(entry.value()));
            if let Some(channel) = channel {
                let event_id = match (&state.event_store, state.enable_json_response) {
                    (Some(store), false) => {
                        Some(store.store_event(&channel.stream_id, &message).await?)
                    }
                    _ => None,
                };
                if let (Some(callback), Some(event_id)) =
                    (&options.on_resumption_token, &event_id)
                {
                    callback(event_id.clone());
                }

                let is_response = matches!(message, JsonRpcMessage::Response(_));
                if channel
                    .tx
                    .send(OutboundFrame { event_id, message })
                    .await
                    .is_err()
                {
                    // Stream consumer went away; drop the mapping.
                    state.request_streams.remove(&key);
                    return Err(TransportError::connection("response stream dropped"));
                }
                if is_response {
                    state.request_streams.remove(&key);
                    channel.remaining.fetch_sub(1, Ordering::SeqCst);
                }
                return Ok(());
            }
        }

        // Server-initiated traffic goes to the standalone GET stream;
        // with no stream attached the message is dropped (the server MAY).
        let mut slot = state.standalone.lock().await;
        if let Some(stream) = slot.as_ref() {
            let event_id = match &state.event_store {
                Some(store) => Some(store.store_event(STANDALONE_STREAM_ID, &message).await?),
                None => None,
            };
            if let (Some(callback), Some(event_id)) = (&options.on_resumption_token, &event_id) {
                callback(event_id.clone());
            }
            if stream
                .tx
                .send(OutboundFrame { event_id, message })
                .await
                .is_err()
            {
                warn!("standalone SSE stream dropped");
                *slot = None;
                state
                    .handler
                    .handle_error(TransportError::connection("standalone SSE stream dropped"))
                    .await;
            }
        } else {
            warn!("no standalone SSE stream attached; dropping server-initiated message");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_running {
            return Ok(());
        }
        // Drop live SSE streams first so graceful shutdown is not held
        // open by their connections.
        if let Some(state) = &self.state {
            state.terminated.store(true, Ordering::SeqCst);
            state.request_streams.clear();
            *state.standalone.lock().await = None;
        }
        self.shutdown.cancel();
        if let Some(task) = self.serve_task.take() {
            let _ = task.await;
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
        self.state.as_ref().and_then(|state| state.current_session())
    }

    fn transport_type(&self) -> &'static str {
        "streamable-http-server"
    }
}

/// Builder for the streamable HTTP server transport
pub struct HttpServerTransportBuilder {
    transport: HttpServerTransport,
}

impl HttpServerTransportBuilder {
    /// Builder from configuration
    pub fn new(config: HttpServerConfig) -> Self {
        Self {
            transport: HttpServerTransport::new(config),
        }
    }
}

impl TransportBuilder for HttpServerTransportBuilder {
    type Transport = HttpServerTransport;

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
