//! Client Session
//!
//! Drives the client side of the protocol: transport startup, the
//! initialize handshake, capability gating, and one typed method per
//! protocol operation. Server-initiated traffic (sampling, roots
//! enumeration, notifications) is answered through handlers registered at
//! build time.

// Layer 1: Standard library imports
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::engine::{
    EngineConfig, McpError, McpResult, NotificationHandler, OutgoingRequestOptions,
    ProgressCallback, ProtocolEngine, RequestContext, RequestHandler,
};
use crate::protocol::constants::{defaults, methods, notifications};
use crate::protocol::{
    CallToolRequest, CallToolResponse, ClientCapabilities, CompleteRequest, CompleteResponse,
    CompletionArgument, CompletionReference, CreateMessageRequest, CreateMessageResponse, Cursor,
    GetPromptRequest, GetPromptResponse, Implementation, InitializeRequest, InitializeResponse,
    ListPromptsRequest, ListPromptsResponse, ListResourceTemplatesRequest,
    ListResourceTemplatesResponse, ListResourcesRequest, ListResourcesResponse, ListRootsResponse,
    ListToolsRequest, ListToolsResponse, LogLevel, LoggingMessageNotification, ProtocolVersion,
    ResourceUpdatedNotification, Root, RootsCapability, SamplingCapability, ServerCapabilities,
    SetLevelRequest, SubscribeRequest, UnsubscribeRequest, Uri,
};
use crate::registry::RootRegistry;
use crate::session::gate::{self, EnforcementMode};
use crate::session::SessionState;
use crate::transport::{MessageContext, SharedTransport, Transport, TransportBuilder, TransportSender};

/// Host-application hook answering `sampling/createMessage`
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Run the requested completion and return the generated message
    async fn create_message(
        &self,
        request: CreateMessageRequest,
        context: RequestContext,
    ) -> McpResult<CreateMessageResponse>;
}

/// Configuration for client session behavior
#[derive(Debug, Clone)]
pub struct ClientSessionConfig {
    /// Client identification sent during initialization
    pub client_info: Implementation,
    /// Capabilities to advertise
    pub capabilities: ClientCapabilities,
    /// Protocol version to request
    pub protocol_version: ProtocolVersion,
    /// Remote-capability enforcement for outgoing requests
    pub enforcement: EnforcementMode,
    /// Default per-request timeout
    pub default_timeout: Duration,
}

impl Default for ClientSessionConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation::new(
                defaults::CLIENT_NAME,
                env!("CARGO_PKG_VERSION"),
            ),
            capabilities: ClientCapabilities::default(),
            protocol_version: ProtocolVersion::latest(),
            enforcement: EnforcementMode::Strict,
            default_timeout: Duration::from_millis(defaults::REQUEST_TIMEOUT_MS),
        }
    }
}

/// What the server told us at initialization
#[derive(Debug, Clone)]
struct NegotiatedServer {
    protocol_version: ProtocolVersion,
    capabilities: ServerCapabilities,
    server_info: Implementation,
    instructions: Option<String>,
}

type NotificationCallback<T> = Arc<dyn Fn(T) + Send + Sync>;
type ListChangedCallback = Arc<dyn Fn() + Send + Sync>;

struct ClientShared {
    state: RwLock<SessionState>,
    negotiated: RwLock<Option<NegotiatedServer>>,
    /// Tools known to declare an output schema, from the last tools/list
    structured_tools: Mutex<HashSet<String>>,
}

impl ClientShared {
    fn state(&self) -> SessionState {
        self.state.read().map(|s| *s).unwrap_or(SessionState::Error)
    }

    fn set_state(&self, next: SessionState) {
        if let Ok(mut state) = self.state.write() {
            if !state.is_terminal() {
                *state = next;
            }
        }
    }

    fn ensure_operational(&self) -> McpResult<()> {
        let state = self.state();
        if state.is_operational() {
            Ok(())
        } else {
            Err(McpError::invalid_request(format!(
                "session is {state}, not operating"
            )))
        }
    }
}

/// Builder for [`ClientSession`]
pub struct ClientSessionBuilder {
    config: ClientSessionConfig,
    roots: Option<Arc<RootRegistry>>,
    sampling_handler: Option<Arc<dyn SamplingHandler>>,
    on_resource_updated: Option<NotificationCallback<ResourceUpdatedNotification>>,
    on_log_message: Option<NotificationCallback<LoggingMessageNotification>>,
    on_tools_list_changed: Option<ListChangedCallback>,
    on_prompts_list_changed: Option<ListChangedCallback>,
    on_resources_list_changed: Option<ListChangedCallback>,
}

impl ClientSessionBuilder {
    /// Start from default configuration
    pub fn new() -> Self {
        Self {
            config: ClientSessionConfig::default(),
            roots: None,
            sampling_handler: None,
            on_resource_updated: None,
            on_log_message: None,
            on_tools_list_changed: None,
            on_prompts_list_changed: None,
            on_resources_list_changed: None,
        }
    }

    /// Set client identification
    pub fn client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.client_info = Implementation::new(name, version);
        self
    }

    /// Request a specific protocol version
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.config.protocol_version = version;
        self
    }

    /// Set remote-capability enforcement
    pub fn enforcement(mut self, enforcement: EnforcementMode) -> Self {
        self.config.enforcement = enforcement;
        self
    }

    /// Set the default per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Expose a roots list; declares the `roots` capability with change
    /// notifications
    pub fn roots(mut self, roots: Arc<RootRegistry>) -> Self {
        self.config.capabilities.roots = Some(RootsCapability {
            list_changed: Some(true),
        });
        self.roots = Some(roots);
        self
    }

    /// Answer sampling requests; declares the `sampling` capability
    pub fn sampling_handler(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.config.capabilities.sampling = Some(SamplingCapability::default());
        self.sampling_handler = Some(handler);
        self
    }

    /// Observe `notifications/resources/updated`
    pub fn on_resource_updated(
        mut self,
        callback: NotificationCallback<ResourceUpdatedNotification>,
    ) -> Self {
        self.on_resource_updated = Some(callback);
        self
    }

    /// Observe `notifications/message` log records
    pub fn on_log_message(
        mut self,
        callback: NotificationCallback<LoggingMessageNotification>,
    ) -> Self {
        self.on_log_message = Some(callback);
        self
    }

    /// Observe `notifications/tools/list_changed`
    pub fn on_tools_list_changed(mut self, callback: ListChangedCallback) -> Self {
        self.on_tools_list_changed = Some(callback);
        self
    }

    /// Observe `notifications/prompts/list_changed`
    pub fn on_prompts_list_changed(mut self, callback: ListChangedCallback) -> Self {
        self.on_prompts_list_changed = Some(callback);
        self
    }

    /// Observe `notifications/resources/list_changed`
    pub fn on_resources_list_changed(mut self, callback: ListChangedCallback) -> Self {
        self.on_resources_list_changed = Some(callback);
        self
    }

    /// Build the transport, connect, and run the initialize handshake
    pub async fn connect<TB>(self, transport_builder: TB) -> McpResult<ClientSession>
    where
        TB: TransportBuilder,
    {
        let sender = TransportSender::unbound();
        let engine = ProtocolEngine::new(sender.clone(), EngineConfig::default());
        let shared = Arc::new(ClientShared {
            state: RwLock::new(SessionState::Disconnected),
            negotiated: RwLock::new(None),
            structured_tools: Mutex::new(HashSet::new()),
        });

        self.register_handlers(&engine, &shared);

        let transport = transport_builder
            .with_message_handler(engine.message_handler())
            .build()
            .await
            .map_err(McpError::from)?;
        let transport: SharedTransport =
            Arc::new(AsyncMutex::new(Box::new(transport) as Box<dyn Transport>));
        sender.bind(&transport);

        shared.set_state(SessionState::Connecting);
        {
            let mut guard = transport.lock().await;
            if let Err(error) = guard.start().await {
                shared.set_state(SessionState::Error);
                return Err(error.into());
            }
        }

        let session = ClientSession {
            config: self.config,
            transport,
            engine,
            shared,
            roots: self.roots,
        };
        session.initialize_handshake().await?;
        session.spawn_close_watcher();
        Ok(session)
    }

    fn register_handlers(&self, engine: &ProtocolEngine, shared: &Arc<ClientShared>) {
        let core = engine.core();

        if let Some(handler) = &self.sampling_handler {
            let _ = core.set_request_handler(
                methods::SAMPLING_CREATE_MESSAGE,
                Arc::new(SamplingRequestHandler {
                    handler: Arc::clone(handler),
                    shared: Arc::clone(shared),
                }),
            );
        }
        if let Some(roots) = &self.roots {
            let _ = core.set_request_handler(
                methods::ROOTS_LIST,
                Arc::new(RootsListHandler {
                    roots: Arc::clone(roots),
                    shared: Arc::clone(shared),
                }),
            );
        }

        if let Some(callback) = &self.on_resource_updated {
            core.set_notification_handler(
                notifications::RESOURCES_UPDATED,
                typed_notification(Arc::clone(callback)),
            );
        }
        if let Some(callback) = &self.on_log_message {
            core.set_notification_handler(
                notifications::MESSAGE,
                typed_notification(Arc::clone(callback)),
            );
        }
        for (method, callback) in [
            (notifications::TOOLS_LIST_CHANGED, &self.on_tools_list_changed),
            (notifications::PROMPTS_LIST_CHANGED, &self.on_prompts_list_changed),
            (
                notifications::RESOURCES_LIST_CHANGED,
                &self.on_resources_list_changed,
            ),
        ] {
            if let Some(callback) = callback {
                let callback = Arc::clone(callback);
                core.set_notification_handler(method, Arc::new(FnNotificationHandler(callback)));
            }
        }
    }
}

impl Default for ClientSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn typed_notification<T>(callback: NotificationCallback<T>) -> Arc<dyn NotificationHandler>
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    struct Typed<T> {
        callback: NotificationCallback<T>,
    }
    #[async_trait]
    impl<T> NotificationHandler for Typed<T>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        async fn handle(&self, params: Option<Value>, _context: MessageContext) -> McpResult<()> {
            let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
            let typed: T = serde_json::from_value(params)?;
            (self.callback)(typed);
            Ok(())
        }
    }
    Arc::new(Typed { callback })
}

struct FnNotificationHandler(ListChangedCallback);

#[async_trait]
impl NotificationHandler for FnNotificationHandler {
    async fn handle(&self, _params: Option<Value>, _context: MessageContext) -> McpResult<()> {
        (self.0)();
        Ok(())
    }
}

struct SamplingRequestHandler {
    handler: Arc<dyn SamplingHandler>,
    shared: Arc<ClientShared>,
}

#[async_trait]
impl RequestHandler for SamplingRequestHandler {
    async fn handle(&self, params: Option<Value>, context: RequestContext) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
        let request: CreateMessageRequest = serde_json::from_value(params)?;
        let response = self.handler.create_message(request, context).await?;
        Ok(serde_json::to_value(response)?)
    }
}

struct RootsListHandler {
    roots: Arc<RootRegistry>,
    shared: Arc<ClientShared>,
}

#[async_trait]
impl RequestHandler for RootsListHandler {
    async fn handle(&self, _params: Option<Value>, _context: RequestContext) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        let response = ListRootsResponse {
            roots: self.roots.list(),
        };
        Ok(serde_json::to_value(response)?)
    }
}

/// High-level MCP client session
pub struct ClientSession {
    config: ClientSessionConfig,
    transport: SharedTransport,
    engine: ProtocolEngine,
    shared: Arc<ClientShared>,
    roots: Option<Arc<RootRegistry>>,
}

impl ClientSession {
    /// Start building a session
    pub fn builder() -> ClientSessionBuilder {
        ClientSessionBuilder::new()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Capabilities the server declared, once initialized
    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.shared
            .negotiated
            .read()
            .ok()
            .and_then(|n| n.as_ref().map(|n| n.capabilities.clone()))
    }

    /// Server identification, once initialized
    pub fn server_info(&self) -> Option<Implementation> {
        self.shared
            .negotiated
            .read()
            .ok()
            .and_then(|n| n.as_ref().map(|n| n.server_info.clone()))
    }

    /// Server usage instructions, when provided
    pub fn instructions(&self) -> Option<String> {
        self.shared
            .negotiated
            .read()
            .ok()
            .and_then(|n| n.as_ref().and_then(|n| n.instructions.clone()))
    }

    /// The protocol version both sides agreed on
    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.shared
            .negotiated
            .read()
            .ok()
            .and_then(|n| n.as_ref().map(|n| n.protocol_version.clone()))
    }

    async fn initialize_handshake(&self) -> McpResult<()> {
        self.shared.set_state(SessionState::Initializing);
        let request = InitializeRequest {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: self.config.capabilities.clone(),
            client_info: self.config.client_info.clone(),
        };
        let result = self
            .engine
            .request(
                methods::INITIALIZE,
                Some(serde_json::to_value(&request)?),
                self.request_options(),
            )
            .await?;
        let response: InitializeResponse = serde_json::from_value(result)?;

        if !response.protocol_version.is_supported() {
            warn!(version = %response.protocol_version, "server offered unsupported protocol version");
            self.shared.set_state(SessionState::Error);
            let mut transport = self.transport.lock().await;
            let _ = transport.close().await;
            return Err(McpError::invalid_request(format!(
                "unsupported protocol version: {}",
                response.protocol_version
            )));
        }

        debug!(
            version = %response.protocol_version,
            server = %response.server_info.name,
            "initialize handshake complete"
        );
        if let Ok(mut negotiated) = self.shared.negotiated.write() {
            *negotiated = Some(NegotiatedServer {
                protocol_version: response.protocol_version,
                capabilities: response.capabilities,
                server_info: response.server_info,
                instructions: response.instructions,
            });
        }
        self.shared.set_state(SessionState::Initialized);
        self.engine
            .notify(notifications::INITIALIZED, None)
            .await?;
        self.shared.set_state(SessionState::Operating);
        Ok(())
    }

    fn spawn_close_watcher(&self) {
        let mut closed = self.engine.core().closed_watch();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            while closed.changed().await.is_ok() {
                if *closed.borrow() {
                    shared.set_state(SessionState::Terminated);
                    break;
                }
            }
        });
    }

    fn request_options(&self) -> OutgoingRequestOptions {
        OutgoingRequestOptions::with_timeout(self.config.default_timeout)
    }

    fn gate(&self, method: &str) -> McpResult<()> {
        let negotiated = self
            .shared
            .negotiated
            .read()
            .ok()
            .and_then(|n| n.as_ref().map(|n| n.capabilities.clone()));
        gate::check_client_request(method, negotiated.as_ref(), self.config.enforcement)
    }

    async fn typed_request<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        options: OutgoingRequestOptions,
    ) -> McpResult<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        self.shared.ensure_operational()?;
        self.gate(method)?;
        let params = match params {
            Some(params) => Some(serde_json::to_value(params)?),
            None => None,
        };
        let result = self.engine.request(method, params, options).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Liveness check
    pub async fn ping(&self) -> McpResult<()> {
        self.shared.ensure_operational()?;
        self.engine
            .request(methods::PING, None, self.request_options())
            .await?;
        Ok(())
    }

    /// `tools/list`
    pub async fn list_tools(&self, cursor: Option<Cursor>) -> McpResult<ListToolsResponse> {
        let response: ListToolsResponse = self
            .typed_request(
                methods::TOOLS_LIST,
                Some(ListToolsRequest { cursor }),
                self.request_options(),
            )
            .await?;
        // Remember which tools promise structured output so call_tool can
        // hold them to it.
        if let Ok(mut structured) = self.shared.structured_tools.lock() {
            for tool in &response.tools {
                if tool.output_schema.is_some() {
                    structured.insert(tool.name.clone());
                } else {
                    structured.remove(&tool.name);
                }
            }
        }
        Ok(response)
    }

    /// `tools/call`
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<Value>,
    ) -> McpResult<CallToolResponse> {
        self.call_tool_with_options(name, arguments, self.request_options())
            .await
    }

    /// `tools/call` with custom timeout/progress options
    pub async fn call_tool_with_options(
        &self,
        name: impl Into<String>,
        arguments: Option<Value>,
        options: OutgoingRequestOptions,
    ) -> McpResult<CallToolResponse> {
        let name = name.into();
        let response: CallToolResponse = self
            .typed_request(
                methods::TOOLS_CALL,
                Some(CallToolRequest {
                    name: name.clone(),
                    arguments,
                }),
                options,
            )
            .await?;

        let declared_structured = self
            .shared
            .structured_tools
            .lock()
            .map(|s| s.contains(&name))
            .unwrap_or(false);
        if declared_structured && !response.is_error() && response.structured_content.is_none() {
            return Err(McpError::invalid_params(format!(
                "tool {name} declares an output schema but returned no structuredContent"
            )));
        }
        Ok(response)
    }

    /// `prompts/list`
    pub async fn list_prompts(&self, cursor: Option<Cursor>) -> McpResult<ListPromptsResponse> {
        self.typed_request(
            methods::PROMPTS_LIST,
            Some(ListPromptsRequest { cursor }),
            self.request_options(),
        )
        .await
    }

    /// `prompts/get`
    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, String>>,
    ) -> McpResult<GetPromptResponse> {
        self.typed_request(
            methods::PROMPTS_GET,
            Some(GetPromptRequest {
                name: name.into(),
                arguments,
            }),
            self.request_options(),
        )
        .await
    }

    /// `resources/list`
    pub async fn list_resources(&self, cursor: Option<Cursor>) -> McpResult<ListResourcesResponse> {
        self.typed_request(
            methods::RESOURCES_LIST,
            Some(ListResourcesRequest { cursor }),
            self.request_options(),
        )
        .await
    }

    /// `resources/templates/list`
    pub async fn list_resource_templates(
        &self,
        cursor: Option<Cursor>,
    ) -> McpResult<ListResourceTemplatesResponse> {
        self.typed_request(
            methods::RESOURCES_TEMPLATES_LIST,
            Some(ListResourceTemplatesRequest { cursor }),
            self.request_options(),
        )
        .await
    }

    /// `resources/read`
    pub async fn read_resource(&self, uri: Uri) -> McpResult<crate::protocol::ReadResourceResponse> {
        self.typed_request(
            methods::RESOURCES_READ,
            Some(crate::protocol::ReadResourceRequest { uri }),
            self.request_options(),
        )
        .await
    }

    /// `resources/subscribe`
    pub async fn subscribe_resource(&self, uri: Uri) -> McpResult<()> {
        let _: Value = self
            .typed_request(
                methods::RESOURCES_SUBSCRIBE,
                Some(SubscribeRequest { uri }),
                self.request_options(),
            )
            .await?;
        Ok(())
    }

    /// `resources/unsubscribe`
    pub async fn unsubscribe_resource(&self, uri: Uri) -> McpResult<()> {
        let _: Value = self
            .typed_request(
                methods::RESOURCES_UNSUBSCRIBE,
                Some(UnsubscribeRequest { uri }),
                self.request_options(),
            )
            .await?;
        Ok(())
    }

    /// `logging/setLevel`
    pub async fn set_log_level(&self, level: LogLevel) -> McpResult<()> {
        let _: Value = self
            .typed_request(
                methods::LOGGING_SET_LEVEL,
                Some(SetLevelRequest { level }),
                self.request_options(),
            )
            .await?;
        Ok(())
    }

    /// `completion/complete`
    pub async fn complete(
        &self,
        reference: CompletionReference,
        argument: CompletionArgument,
    ) -> McpResult<CompleteResponse> {
        self.typed_request(
            methods::COMPLETION_COMPLETE,
            Some(CompleteRequest {
                reference,
                argument,
            }),
            self.request_options(),
        )
        .await
    }

    /// Issue a raw request (escape hatch for experimental methods)
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: OutgoingRequestOptions,
    ) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        self.gate(method)?;
        self.engine.request(method, params, options).await
    }

    /// Issue a raw request with a progress callback
    pub async fn request_with_progress(
        &self,
        method: &str,
        params: Option<Value>,
        mut options: OutgoingRequestOptions,
        on_progress: ProgressCallback,
    ) -> McpResult<Value> {
        options.on_progress = Some(on_progress);
        self.request(method, params, options).await
    }

    /// Add a root and emit `notifications/roots/list_changed` when the
    /// capability allows
    pub async fn add_root(&self, root: Root) -> McpResult<bool> {
        let Some(roots) = &self.roots else {
            return Err(McpError::invalid_request("session exposes no roots"));
        };
        let added = roots.add(root)?;
        if added {
            self.notify_roots_changed().await;
        }
        Ok(added)
    }

    /// Remove a root and emit `notifications/roots/list_changed` when the
    /// capability allows
    pub async fn remove_root(&self, uri: &str) -> McpResult<bool> {
        let Some(roots) = &self.roots else {
            return Err(McpError::invalid_request("session exposes no roots"));
        };
        let removed = roots.remove(uri);
        if removed {
            self.notify_roots_changed().await;
        }
        Ok(removed)
    }

    async fn notify_roots_changed(&self) {
        if gate::check_client_notification(
            notifications::ROOTS_LIST_CHANGED,
            &self.config.capabilities,
        )
        .is_err()
        {
            return;
        }
        if let Err(error) = self
            .engine
            .notify(notifications::ROOTS_LIST_CHANGED, None)
            .await
        {
            warn!(%error, "failed to emit roots/list_changed");
        }
    }

    /// Orderly shutdown: close the transport and fail pending requests
    pub async fn close(&self) -> McpResult<()> {
        self.shared.set_state(SessionState::ShuttingDown);
        {
            let mut transport = self.transport.lock().await;
            transport.close().await?;
        }
        self.engine.shutdown();
        self.shared.set_state(SessionState::Terminated);
        Ok(())
    }
}
