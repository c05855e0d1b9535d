//! Protocol Engine
//!
//! The engine turns a transport's message stream into a reliable
//! request/response/notification exchange:
//!
//! - assigns monotonically increasing ids to outgoing requests and
//!   correlates their responses through the pending-request table
//! - enforces per-request timeouts, progress-based timer resets, and the
//!   hard total-timeout cap, emitting `notifications/cancelled` for
//!   expired requests
//! - dispatches inbound requests to registered handlers on their own
//!   tasks, each with a cancellation token honored by
//!   `notifications/cancelled`
//! - routes inbound progress notifications to per-request callbacks
//! - answers `ping` built-in
//!
//! Inbound processing for a transport is serialized (one message at a
//! time); request handlers run concurrently on spawned tasks so a
//! cancellation arriving mid-handler can still be observed.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

// Layer 3: Internal module imports
use crate::correlation::{
    CorrelationConfig, CorrelationError, CorrelationManager, RequestIdGenerator, RequestOptions,
    TimeoutKind,
};
use crate::protocol::constants::{defaults, methods, notifications};
use crate::protocol::{
    CancelledNotification, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ProgressNotification, ProgressToken, RequestId,
};
use crate::transport::{
    MessageContext, MessageHandler, SendOptions, TransportError, TransportSender,
};

pub mod context;
pub mod error;

pub use context::{Peer, RequestContext};
pub use error::{McpError, McpResult};

/// Callback invoked for each progress notification of a request
pub type ProgressCallback = Arc<dyn Fn(ProgressNotification) + Send + Sync>;

/// Callback invoked for transport-level errors
pub type ErrorCallback = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Handler for one inbound request method
///
/// Returning `Err` produces a JSON-RPC error response with the error's
/// canonical code; panics are caught and surface as `InternalError`.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle an inbound request
    async fn handle(&self, params: Option<Value>, context: RequestContext) -> McpResult<Value>;
}

/// Handler for one inbound notification method
///
/// Notifications never produce responses; errors are logged and dropped.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Handle an inbound notification
    async fn handle(&self, params: Option<Value>, context: MessageContext) -> McpResult<()>;
}

/// Options for one outgoing request
#[derive(Clone, Default)]
pub struct OutgoingRequestOptions {
    /// Timeout policy
    pub request: RequestOptions,

    /// Progress callback; setting this installs a progress token equal to
    /// the request id under `params._meta.progressToken`
    pub on_progress: Option<ProgressCallback>,

    /// Bind this request to an inbound request for stream association
    pub related_request_id: Option<RequestId>,
}

impl OutgoingRequestOptions {
    /// Options with a specific per-request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            request: RequestOptions::with_timeout(timeout),
            ..Default::default()
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pending-table limits
    pub correlation: CorrelationConfig,

    /// How often the expiry sweep runs
    pub sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            correlation: CorrelationConfig::default(),
            sweep_interval: Duration::from_millis(defaults::EXPIRY_SWEEP_INTERVAL_MS),
        }
    }
}

struct InFlightRequest {
    token: CancellationToken,
    method: String,
}

/// Shared engine state reachable from handlers and spawned tasks
pub struct EngineCore {
    sender: TransportSender,
    correlation: CorrelationManager,
    id_generator: RequestIdGenerator,

    request_handlers: DashMap<String, Arc<dyn RequestHandler>>,
    fallback_request_handler: std::sync::RwLock<Option<Arc<dyn RequestHandler>>>,
    notification_handlers: DashMap<String, Arc<dyn NotificationHandler>>,
    fallback_notification_handler: std::sync::RwLock<Option<Arc<dyn NotificationHandler>>>,

    /// Progress callbacks by token; a re-registered token replaces the
    /// previous callback (tokens are per-sender, last registrant wins)
    progress_callbacks: DashMap<ProgressToken, ProgressCallback>,

    /// Inbound requests currently executing, for cancellation
    in_flight: DashMap<RequestId, InFlightRequest>,

    error_callback: std::sync::RwLock<Option<ErrorCallback>>,

    closed_tx: watch::Sender<bool>,
}

impl EngineCore {
    fn new(sender: TransportSender, config: &EngineConfig) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            sender,
            correlation: CorrelationManager::new(config.correlation.clone()),
            id_generator: RequestIdGenerator::new(),
            request_handlers: DashMap::new(),
            fallback_request_handler: std::sync::RwLock::new(None),
            notification_handlers: DashMap::new(),
            fallback_notification_handler: std::sync::RwLock::new(None),
            progress_callbacks: DashMap::new(),
            in_flight: DashMap::new(),
            error_callback: std::sync::RwLock::new(None),
            closed_tx,
        }
    }

    /// Issue a request and await its outcome
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: OutgoingRequestOptions,
    ) -> McpResult<Value> {
        let id = self.id_generator.next_id();
        let params = self.install_progress(&id, params, options.on_progress.clone())?;

        let receiver = self
            .correlation
            .register(id.clone(), method, options.request.clone())
            .map_err(McpError::from)?;

        let request = JsonRpcRequest::new(method, params, id.clone());
        let send_options = SendOptions {
            related_request_id: options.related_request_id,
            ..Default::default()
        };

        if let Err(error) = self
            .sender
            .send(JsonRpcMessage::Request(request), send_options)
            .await
        {
            // Transport rejected the frame: undo the bookkeeping and
            // surface the send failure, not a timeout.
            self.correlation.cancel(&id, None);
            self.remove_progress(&id);
            return Err(error.into());
        }

        let outcome = receiver
            .await
            .map_err(|_| McpError::internal("response channel dropped"));
        self.remove_progress(&id);
        outcome?.map_err(McpError::from)
    }

    /// Send a notification; no bookkeeping beyond serialization
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.notify_related(method, params, None).await
    }

    pub(crate) async fn notify_related(
        &self,
        method: &str,
        params: Option<Value>,
        related_request_id: Option<RequestId>,
    ) -> McpResult<()> {
        let notification = JsonRpcNotification::new(method, params);
        let options = SendOptions {
            related_request_id,
            ..Default::default()
        };
        self.sender
            .send(JsonRpcMessage::Notification(notification), options)
            .await
            .map_err(McpError::from)
    }

    /// Cancel an outgoing request: fail the waiter and notify the peer
    ///
    /// `initialize` is never cancelled on the wire by contract.
    pub async fn cancel_request(&self, id: &RequestId, reason: Option<String>) {
        let Some(method) = self.correlation.cancel(id, reason.clone()) else {
            return;
        };
        self.remove_progress(id);
        if method != methods::INITIALIZE {
            self.send_cancelled_notification(id, reason).await;
        }
    }

    async fn send_cancelled_notification(&self, id: &RequestId, reason: Option<String>) {
        let params = CancelledNotification {
            request_id: id.clone(),
            reason,
        };
        let params = match serde_json::to_value(params) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(%error, "failed to serialize cancelled notification");
                return;
            }
        };
        if let Err(error) = self.notify(notifications::CANCELLED, params).await {
            trace!(%error, "could not emit cancelled notification");
        }
    }

    fn install_progress(
        &self,
        id: &RequestId,
        params: Option<Value>,
        on_progress: Option<ProgressCallback>,
    ) -> McpResult<Option<Value>> {
        let Some(callback) = on_progress else {
            return Ok(params);
        };
        let token = ProgressToken::from(id);
        let mut map = match params {
            None => serde_json::Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(McpError::invalid_params(
                    "progress requires object-shaped params",
                ))
            }
        };
        let meta = map
            .entry("_meta")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(meta_map) = meta {
            meta_map.insert("progressToken".to_string(), serde_json::to_value(&token)?);
        }
        self.progress_callbacks.insert(token, callback);
        Ok(Some(Value::Object(map)))
    }

    fn remove_progress(&self, id: &RequestId) {
        self.progress_callbacks.remove(&ProgressToken::from(id));
    }

    // -- handler registration ------------------------------------------------

    /// Register a request handler; re-registering a method is rejected
    pub fn set_request_handler(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn RequestHandler>,
    ) -> McpResult<()> {
        let method = method.into();
        if self.request_handlers.contains_key(&method) {
            return Err(McpError::invalid_request(format!(
                "request handler for {method} already registered"
            )));
        }
        self.request_handlers.insert(method, handler);
        Ok(())
    }

    /// Register a request handler, replacing any existing one
    pub fn replace_request_handler(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn RequestHandler>,
    ) {
        self.request_handlers.insert(method.into(), handler);
    }

    /// Remove a request handler
    pub fn remove_request_handler(&self, method: &str) {
        self.request_handlers.remove(method);
    }

    /// Install the fallback for requests with no registered handler
    pub fn set_fallback_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        if let Ok(mut slot) = self.fallback_request_handler.write() {
            *slot = Some(handler);
        }
    }

    /// Register a notification handler; silently replaces (last-writer-wins)
    pub fn set_notification_handler(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.notification_handlers.insert(method.into(), handler);
    }

    /// Install the fallback for notifications with no registered handler
    pub fn set_fallback_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        if let Ok(mut slot) = self.fallback_notification_handler.write() {
            *slot = Some(handler);
        }
    }

    /// Install the transport-error observer
    pub fn set_error_callback(&self, callback: ErrorCallback) {
        if let Ok(mut slot) = self.error_callback.write() {
            *slot = Some(callback);
        }
    }

    /// Watch that flips to true when the transport closes
    pub fn closed_watch(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }

    /// Number of outgoing requests awaiting responses
    pub fn pending_count(&self) -> usize {
        self.correlation.pending_count()
    }

    // -- inbound routing -----------------------------------------------------

    async fn dispatch_response(&self, response: JsonRpcResponse) {
        let Some(id) = response.id.clone() else {
            self.report_error(TransportError::protocol("response without id"));
            return;
        };
        let outcome = match response.error {
            Some(error) => Err(CorrelationError::Remote { error }),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        if let Err(error) = self.correlation.correlate(&id, outcome) {
            // Unknown id: late response for a completed or timed-out
            // request.
            warn!(%id, %error, "dropping uncorrelated response");
            self.report_error(TransportError::protocol(format!(
                "response for unknown request id {id}"
            )));
        }
    }

    async fn dispatch_notification(
        self: Arc<Self>,
        notification: JsonRpcNotification,
        context: MessageContext,
    ) {
        match notification.method.as_str() {
            notifications::CANCELLED => self.handle_cancelled(&notification),
            notifications::PROGRESS => self.handle_progress(&notification),
            _ => {}
        }

        let handler = self
            .notification_handlers
            .get(&notification.method)
            .map(|entry| Arc::clone(entry.value()))
            .or_else(|| {
                self.fallback_notification_handler
                    .read()
                    .ok()
                    .and_then(|slot| slot.clone())
            });
        let Some(handler) = handler else {
            trace!(method = %notification.method, "no handler for notification");
            return;
        };
        if let Err(error) = handler.handle(notification.params.clone(), context).await {
            warn!(method = %notification.method, %error, "notification handler failed");
        }
    }

    fn handle_cancelled(&self, notification: &JsonRpcNotification) {
        let Some(params) = notification.params.clone() else {
            return;
        };
        let Ok(cancelled) = serde_json::from_value::<CancelledNotification>(params) else {
            warn!("malformed cancelled notification");
            return;
        };
        let Some((_, in_flight)) = self.in_flight.remove(&cancelled.request_id) else {
            trace!(id = %cancelled.request_id, "cancellation for unknown request");
            return;
        };
        if in_flight.method == methods::INITIALIZE {
            // initialize is not cancellable; restore the entry untouched.
            self.in_flight.insert(cancelled.request_id, in_flight);
            return;
        }
        debug!(id = %cancelled.request_id, reason = ?cancelled.reason, "aborting in-flight request");
        in_flight.token.cancel();
    }

    fn handle_progress(&self, notification: &JsonRpcNotification) {
        let Some(params) = notification.params.clone() else {
            return;
        };
        let Ok(progress) = serde_json::from_value::<ProgressNotification>(params) else {
            warn!("malformed progress notification");
            return;
        };

        // Progress restarts the per-request timer for requests that opted
        // in; the token mirrors the request id for engine-issued requests.
        let request_id = match &progress.progress_token {
            ProgressToken::Number(n) => RequestId::Number(*n),
            ProgressToken::String(s) => RequestId::String(s.clone()),
        };
        self.correlation.record_progress(&request_id);

        if let Some(callback) = self
            .progress_callbacks
            .get(&progress.progress_token)
            .map(|entry| Arc::clone(entry.value()))
        {
            callback(progress);
        }
    }

    async fn dispatch_request(self: Arc<Self>, request: JsonRpcRequest, context: MessageContext) {
        let handler = self
            .request_handlers
            .get(&request.method)
            .map(|entry| Arc::clone(entry.value()))
            .or_else(|| {
                self.fallback_request_handler
                    .read()
                    .ok()
                    .and_then(|slot| slot.clone())
            });

        let Some(handler) = handler else {
            let response = if request.method == methods::PING {
                // ping is answered built-in with an empty result.
                JsonRpcResponse::success(json!({}), request.id.clone())
            } else {
                debug!(method = %request.method, "no handler registered");
                let error = McpError::method_not_found(&request.method);
                JsonRpcResponse::error(error.to_json_rpc_error(), Some(request.id.clone()))
            };
            // Replies are sent off the reader task; the transport lock is
            // never taken from inbound processing.
            let core = Arc::clone(&self);
            tokio::spawn(async move {
                core.send_response(response, request.id).await;
            });
            return;
        };

        if self.in_flight.contains_key(&request.id) {
            // An id may not be reused while its request is outstanding.
            let response = JsonRpcResponse::error(
                JsonRpcError::new(
                    crate::protocol::constants::error_codes::INVALID_REQUEST,
                    format!("request id {} already in use", request.id),
                    None,
                ),
                Some(request.id.clone()),
            );
            let core = Arc::clone(&self);
            tokio::spawn(async move {
                core.send_response(response, request.id).await;
            });
            return;
        }

        let token = CancellationToken::new();
        self.in_flight.insert(
            request.id.clone(),
            InFlightRequest {
                token: token.clone(),
                method: request.method.clone(),
            },
        );

        let (meta, progress_token) = extract_meta(&request.params);
        let request_context = RequestContext {
            request_id: request.id.clone(),
            session_id: context.session_id().map(str::to_string),
            meta,
            progress_token,
            cancellation: token,
            peer: Peer {
                engine: Arc::clone(&self),
                related: Some(request.id.clone()),
            },
        };

        // Handlers run on their own task so the reader loop stays free to
        // deliver a cancellation for this very request.
        let core = Arc::clone(&self);
        tokio::spawn(async move {
            let id = request.id.clone();
            let outcome =
                std::panic::AssertUnwindSafe(handler.handle(request.params, request_context))
                    .catch_unwind()
                    .await;

            let still_live = core
                .in_flight
                .remove(&id)
                .map(|(_, entry)| !entry.token.is_cancelled())
                .unwrap_or(false);
            if !still_live {
                // A cancelled request must not be answered.
                debug!(%id, "suppressing response for cancelled request");
                return;
            }

            let response = match outcome {
                Ok(Ok(result)) => JsonRpcResponse::success(result, id.clone()),
                Ok(Err(error)) => {
                    JsonRpcResponse::error(error.to_json_rpc_error(), Some(id.clone()))
                }
                Err(_) => JsonRpcResponse::error(
                    JsonRpcError::new(
                        crate::protocol::constants::error_codes::INTERNAL_ERROR,
                        "internal error",
                        None,
                    ),
                    Some(id.clone()),
                ),
            };
            core.send_response(response, id).await;
        });
    }

    async fn send_response(&self, response: JsonRpcResponse, related: RequestId) {
        if let Err(error) = self
            .sender
            .send(
                JsonRpcMessage::Response(response),
                SendOptions::related_to(related),
            )
            .await
        {
            warn!(%error, "failed to send response");
        }
    }

    fn report_error(&self, error: TransportError) {
        if let Ok(slot) = self.error_callback.read() {
            if let Some(callback) = slot.as_ref() {
                callback(&error);
            }
        }
    }

    fn on_transport_closed(&self) {
        self.correlation.fail_all_closed();
        for entry in self.in_flight.iter() {
            entry.value().token.cancel();
        }
        self.in_flight.clear();
        self.progress_callbacks.clear();
        let _ = self.closed_tx.send(true);
    }
}

/// Transport-facing message handler that feeds the engine
struct EngineMessageHandler {
    core: Arc<EngineCore>,
}

#[async_trait]
impl MessageHandler for EngineMessageHandler {
    async fn handle_message(&self, message: JsonRpcMessage, context: MessageContext) {
        match message {
            JsonRpcMessage::Request(request) => {
                Arc::clone(&self.core).dispatch_request(request, context).await;
            }
            JsonRpcMessage::Notification(notification) => {
                Arc::clone(&self.core)
                    .dispatch_notification(notification, context)
                    .await;
            }
            JsonRpcMessage::Response(response) => {
                self.core.dispatch_response(response).await;
            }
        }
    }

    async fn handle_error(&self, error: TransportError) {
        warn!(%error, "transport error");
        self.core.report_error(error);
    }

    async fn handle_close(&self) {
        debug!("transport closed");
        self.core.on_transport_closed();
    }
}

/// The protocol engine: owns the shared core and the expiry sweep task
///
/// Construct one per session; obtain the transport's message handler from
/// [`ProtocolEngine::message_handler`] before building the transport.
pub struct ProtocolEngine {
    core: Arc<EngineCore>,
    sweep_guard: CancellationToken,
}

impl ProtocolEngine {
    /// Create an engine sending through `sender`
    pub fn new(sender: TransportSender, config: EngineConfig) -> Self {
        let core = Arc::new(EngineCore::new(sender, &config));
        let sweep_guard = CancellationToken::new();

        let sweep_core = Arc::clone(&core);
        let guard = sweep_guard.clone();
        let interval = config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = guard.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                for expired in sweep_core.correlation.take_expired() {
                    sweep_core.remove_progress(&expired.id);
                    if expired.method == methods::INITIALIZE {
                        continue;
                    }
                    let reason = match expired.kind {
                        TimeoutKind::PerRequest => "request timed out",
                        TimeoutKind::Total => "maximum total timeout exceeded",
                    };
                    sweep_core
                        .send_cancelled_notification(&expired.id, Some(reason.to_string()))
                        .await;
                }
            }
        });

        Self { core, sweep_guard }
    }

    /// Shared core, for handlers that need long-lived access
    pub fn core(&self) -> Arc<EngineCore> {
        Arc::clone(&self.core)
    }

    /// The handler to install on the transport
    pub fn message_handler(&self) -> Arc<dyn MessageHandler> {
        Arc::new(EngineMessageHandler {
            core: Arc::clone(&self.core),
        })
    }

    /// Issue a request and await its outcome
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: OutgoingRequestOptions,
    ) -> McpResult<Value> {
        self.core.request(method, params, options).await
    }

    /// Send a notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.core.notify(method, params).await
    }

    /// Cancel an outgoing request
    pub async fn cancel_request(&self, id: &RequestId, reason: Option<String>) {
        self.core.cancel_request(id, reason).await;
    }

    /// Fail all pending work and stop the sweep task
    pub fn shutdown(&self) {
        self.sweep_guard.cancel();
        self.core.on_transport_closed();
    }
}

impl Drop for ProtocolEngine {
    fn drop(&mut self) {
        self.sweep_guard.cancel();
    }
}

fn extract_meta(params: &Option<Value>) -> (Option<Value>, Option<ProgressToken>) {
    let meta = params.as_ref().and_then(|p| p.get("_meta")).cloned();
    let progress_token = meta
        .as_ref()
        .and_then(|m| m.get("progressToken"))
        .and_then(|v| serde_json::from_value(v.clone()).ok());
    (meta, progress_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_meta_reads_progress_token() {
        let params = Some(json!({
            "name": "slow",
            "_meta": {"progressToken": 42}
        }));
        let (meta, token) = extract_meta(&params);
        assert!(meta.is_some());
        assert_eq!(token, Some(ProgressToken::Number(42)));

        let (meta, token) = extract_meta(&Some(json!({"name": "fast"})));
        assert!(meta.is_none());
        assert!(token.is_none());
    }

    #[test]
    fn duplicate_request_handler_rejected() {
        struct Nop;
        #[async_trait]
        impl RequestHandler for Nop {
            async fn handle(
                &self,
                _params: Option<Value>,
                _context: RequestContext,
            ) -> McpResult<Value> {
                Ok(Value::Null)
            }
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = runtime.enter();
        let engine = ProtocolEngine::new(TransportSender::unbound(), EngineConfig::default());
        engine
            .core()
            .set_request_handler("tools/list", Arc::new(Nop))
            .unwrap();
        assert!(engine
            .core()
            .set_request_handler("tools/list", Arc::new(Nop))
            .is_err());
        engine.core().replace_request_handler("tools/list", Arc::new(Nop));
    }
}
