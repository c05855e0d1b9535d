//! Server Session
//!
//! Accepts the initialize handshake, derives declared capabilities from
//! the attached registries, dispatches the full client-facing method
//! surface, and emits server-initiated traffic (logging, list-changed and
//! resource-update notifications, sampling and roots requests) under the
//! capability gate.

// Layer 1: Standard library imports
use std::sync::{Arc, RwLock};
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::engine::{
    EngineConfig, McpError, McpResult, NotificationHandler, OutgoingRequestOptions,
    ProtocolEngine, RequestContext, RequestHandler,
};
use crate::protocol::constants::{defaults, methods, notifications};
use crate::protocol::{
    CallToolRequest, ClientCapabilities, CompleteRequest, CompleteResponse, CompletionsCapability,
    CreateMessageRequest, CreateMessageResponse, GetPromptRequest, Implementation,
    InitializeRequest, InitializeResponse, ListPromptsRequest, ListPromptsResponse,
    ListResourceTemplatesRequest, ListResourceTemplatesResponse, ListResourcesRequest,
    ListResourcesResponse, ListRootsResponse, ListToolsRequest, ListToolsResponse, LogLevel,
    LoggingCapability, LoggingMessageNotification, PromptsCapability, ProtocolVersion,
    ReadResourceRequest, ResourceUpdatedNotification, ResourcesCapability, ServerCapabilities,
    SetLevelRequest, SubscribeRequest, ToolsCapability, UnsubscribeRequest,
};
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry, LOCAL_CONNECTION};
use crate::session::gate::{self, EnforcementMode};
use crate::session::SessionState;
use crate::transport::{
    MessageContext, SharedTransport, Transport, TransportBuilder, TransportSender,
};

/// Server-side hook answering `completion/complete`
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// Produce completion candidates for the referenced argument
    async fn complete(
        &self,
        request: CompleteRequest,
        context: RequestContext,
    ) -> McpResult<CompleteResponse>;
}

/// Configuration for server session behavior
#[derive(Debug, Clone)]
pub struct ServerSessionConfig {
    /// Server identification returned during initialization
    pub server_info: Implementation,
    /// Usage instructions returned during initialization
    pub instructions: Option<String>,
    /// Remote-capability enforcement for outgoing requests
    pub enforcement: EnforcementMode,
    /// Default per-request timeout for server-initiated requests
    pub default_timeout: Duration,
}

impl Default for ServerSessionConfig {
    fn default() -> Self {
        Self {
            server_info: Implementation::new(
                defaults::SERVER_NAME,
                env!("CARGO_PKG_VERSION"),
            ),
            instructions: None,
            enforcement: EnforcementMode::Strict,
            default_timeout: Duration::from_millis(defaults::REQUEST_TIMEOUT_MS),
        }
    }
}

struct ServerShared {
    state: RwLock<SessionState>,
    client: RwLock<Option<(ClientCapabilities, Implementation)>>,
    negotiated_version: RwLock<Option<ProtocolVersion>>,
    /// Minimum severity the client asked for via logging/setLevel
    log_level: RwLock<Option<LogLevel>>,
    own_capabilities: ServerCapabilities,
    on_initialized: RwLock<Option<Arc<dyn Fn() + Send + Sync>>>,
}

impl ServerShared {
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

    /// Non-handshake traffic is rejected until the session operates
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

    fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.client
            .read()
            .ok()
            .and_then(|c| c.as_ref().map(|(caps, _)| caps.clone()))
    }
}

/// Builder for [`ServerSession`]
pub struct ServerSessionBuilder {
    config: ServerSessionConfig,
    tools: Option<Arc<ToolRegistry>>,
    prompts: Option<Arc<PromptRegistry>>,
    resources: Option<Arc<ResourceRegistry>>,
    completion: Option<Arc<dyn CompletionHandler>>,
    enable_logging: bool,
    on_initialized: Option<Arc<dyn Fn() + Send + Sync>>,
    on_roots_list_changed: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl ServerSessionBuilder {
    /// Start from default configuration
    pub fn new() -> Self {
        Self {
            config: ServerSessionConfig::default(),
            tools: None,
            prompts: None,
            resources: None,
            completion: None,
            enable_logging: false,
            on_initialized: None,
            on_roots_list_changed: None,
        }
    }

    /// Set server identification
    pub fn server_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.server_info = Implementation::new(name, version);
        self
    }

    /// Set the instructions returned at initialization
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    /// Set remote-capability enforcement
    pub fn enforcement(mut self, enforcement: EnforcementMode) -> Self {
        self.config.enforcement = enforcement;
        self
    }

    /// Expose a tool catalog; declares `tools` with change notifications
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Expose a prompt catalog; declares `prompts` with change
    /// notifications
    pub fn prompts(mut self, prompts: Arc<PromptRegistry>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// Expose a resource catalog; declares `resources` with subscription
    /// and change notifications
    pub fn resources(mut self, resources: Arc<ResourceRegistry>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Answer completion requests; declares `completions`
    pub fn completion_handler(mut self, handler: Arc<dyn CompletionHandler>) -> Self {
        self.completion = Some(handler);
        self
    }

    /// Emit `notifications/message`; declares `logging`
    pub fn logging(mut self) -> Self {
        self.enable_logging = true;
        self
    }

    /// Observe the client's initialized notification
    pub fn on_initialized(mut self, callback: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.on_initialized = Some(callback);
        self
    }

    /// Observe `notifications/roots/list_changed` from the client
    pub fn on_roots_list_changed(mut self, callback: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.on_roots_list_changed = Some(callback);
        self
    }

    fn derive_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            experimental: None,
            logging: self.enable_logging.then(LoggingCapability::default),
            completions: self.completion.as_ref().map(|_| CompletionsCapability::default()),
            prompts: self.prompts.as_ref().map(|_| PromptsCapability {
                list_changed: Some(true),
            }),
            resources: self.resources.as_ref().map(|_| ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            tools: self.tools.as_ref().map(|_| ToolsCapability {
                list_changed: Some(true),
            }),
        }
    }

    /// Build the transport and start serving
    pub async fn serve<TB>(self, transport_builder: TB) -> McpResult<ServerSession>
    where
        TB: TransportBuilder,
    {
        let sender = TransportSender::unbound();
        let engine = ProtocolEngine::new(sender.clone(), EngineConfig::default());
        let shared = Arc::new(ServerShared {
            state: RwLock::new(SessionState::Disconnected),
            client: RwLock::new(None),
            negotiated_version: RwLock::new(None),
            log_level: RwLock::new(None),
            own_capabilities: self.derive_capabilities(),
            on_initialized: RwLock::new(self.on_initialized.clone()),
        });

        self.register_handlers(&engine, &shared)?;

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
        shared.set_state(SessionState::Initializing);

        let session = ServerSession {
            config: self.config,
            transport,
            engine,
            shared,
            tools: self.tools,
            prompts: self.prompts,
            resources: self.resources,
        };
        session.spawn_close_watcher();
        Ok(session)
    }

    fn register_handlers(
        &self,
        engine: &ProtocolEngine,
        shared: &Arc<ServerShared>,
    ) -> McpResult<()> {
        let core = engine.core();

        core.set_request_handler(
            methods::INITIALIZE,
            Arc::new(InitializeHandler {
                shared: Arc::clone(shared),
                server_info: self.config.server_info.clone(),
                instructions: self.config.instructions.clone(),
            }),
        )?;
        core.set_notification_handler(
            notifications::INITIALIZED,
            Arc::new(InitializedHandler {
                shared: Arc::clone(shared),
            }),
        );
        if let Some(callback) = &self.on_roots_list_changed {
            core.set_notification_handler(
                notifications::ROOTS_LIST_CHANGED,
                Arc::new(CallbackNotificationHandler(Arc::clone(callback))),
            );
        }

        if let Some(tools) = &self.tools {
            core.set_request_handler(
                methods::TOOLS_LIST,
                Arc::new(ToolsListHandler {
                    shared: Arc::clone(shared),
                    tools: Arc::clone(tools),
                }),
            )?;
            core.set_request_handler(
                methods::TOOLS_CALL,
                Arc::new(ToolsCallHandler {
                    shared: Arc::clone(shared),
                    tools: Arc::clone(tools),
                }),
            )?;
        }
        if let Some(prompts) = &self.prompts {
            core.set_request_handler(
                methods::PROMPTS_LIST,
                Arc::new(PromptsListHandler {
                    shared: Arc::clone(shared),
                    prompts: Arc::clone(prompts),
                }),
            )?;
            core.set_request_handler(
                methods::PROMPTS_GET,
                Arc::new(PromptsGetHandler {
                    shared: Arc::clone(shared),
                    prompts: Arc::clone(prompts),
                }),
            )?;
        }
        if let Some(resources) = &self.resources {
            for (method, operation) in [
                (methods::RESOURCES_LIST, ResourceOperation::List),
                (
                    methods::RESOURCES_TEMPLATES_LIST,
                    ResourceOperation::ListTemplates,
                ),
                (methods::RESOURCES_READ, ResourceOperation::Read),
                (methods::RESOURCES_SUBSCRIBE, ResourceOperation::Subscribe),
                (
                    methods::RESOURCES_UNSUBSCRIBE,
                    ResourceOperation::Unsubscribe,
                ),
            ] {
                core.set_request_handler(
                    method,
                    Arc::new(ResourcesHandler {
                        shared: Arc::clone(shared),
                        resources: Arc::clone(resources),
                        operation,
                    }),
                )?;
            }
        }
        if self.enable_logging {
            core.set_request_handler(
                methods::LOGGING_SET_LEVEL,
                Arc::new(SetLevelHandler {
                    shared: Arc::clone(shared),
                }),
            )?;
        }
        if let Some(completion) = &self.completion {
            core.set_request_handler(
                methods::COMPLETION_COMPLETE,
                Arc::new(CompleteHandler {
                    shared: Arc::clone(shared),
                    completion: Arc::clone(completion),
                }),
            )?;
        }
        Ok(())
    }
}

impl Default for ServerSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// -- request handlers --------------------------------------------------------

struct InitializeHandler {
    shared: Arc<ServerShared>,
    server_info: Implementation,
    instructions: Option<String>,
}

#[async_trait]
impl RequestHandler for InitializeHandler {
    async fn handle(&self, params: Option<Value>, _context: RequestContext) -> McpResult<Value> {
        let state = self.shared.state();
        if !matches!(
            state,
            SessionState::Connecting | SessionState::Initializing
        ) {
            return Err(McpError::invalid_request(format!(
                "initialize received while {state}"
            )));
        }
        let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
        let request: InitializeRequest = serde_json::from_value(params)?;

        // Echo a supported requested version, otherwise answer with the
        // latest we speak and let the client decide.
        let version = if request.protocol_version.is_supported() {
            request.protocol_version.clone()
        } else {
            ProtocolVersion::latest()
        };
        debug!(
            client = %request.client_info.name,
            requested = %request.protocol_version,
            selected = %version,
            "initialize accepted"
        );

        if let Ok(mut client) = self.shared.client.write() {
            *client = Some((request.capabilities, request.client_info));
        }
        if let Ok(mut negotiated) = self.shared.negotiated_version.write() {
            *negotiated = Some(version.clone());
        }
        self.shared.set_state(SessionState::Initialized);

        let response = InitializeResponse::new(
            version,
            self.shared.own_capabilities.clone(),
            self.server_info.clone(),
            self.instructions.clone(),
        );
        Ok(serde_json::to_value(response)?)
    }
}

struct CallbackNotificationHandler(Arc<dyn Fn() + Send + Sync>);

#[async_trait]
impl NotificationHandler for CallbackNotificationHandler {
    async fn handle(&self, _params: Option<Value>, _context: MessageContext) -> McpResult<()> {
        (self.0)();
        Ok(())
    }
}

struct InitializedHandler {
    shared: Arc<ServerShared>,
}

#[async_trait]
impl NotificationHandler for InitializedHandler {
    async fn handle(&self, _params: Option<Value>, _context: MessageContext) -> McpResult<()> {
        if self.shared.state() != SessionState::Initialized {
            warn!("initialized notification out of sequence");
            return Ok(());
        }
        debug!("session operating");
        self.shared.set_state(SessionState::Operating);
        let callback = self
            .shared
            .on_initialized
            .read()
            .ok()
            .and_then(|c| c.clone());
        if let Some(callback) = callback {
            callback();
        }
        Ok(())
    }
}

struct ToolsListHandler {
    shared: Arc<ServerShared>,
    tools: Arc<ToolRegistry>,
}

#[async_trait]
impl RequestHandler for ToolsListHandler {
    async fn handle(&self, params: Option<Value>, _context: RequestContext) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        let request: ListToolsRequest = parse_params_or_default(params)?;
        let page = self.tools.list(request.cursor.as_ref())?;
        Ok(serde_json::to_value(ListToolsResponse {
            tools: page.items,
            next_cursor: page.next_cursor,
        })?)
    }
}

struct ToolsCallHandler {
    shared: Arc<ServerShared>,
    tools: Arc<ToolRegistry>,
}

#[async_trait]
impl RequestHandler for ToolsCallHandler {
    async fn handle(&self, params: Option<Value>, context: RequestContext) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
        let request: CallToolRequest = serde_json::from_value(params)?;
        let result = self
            .tools
            .call(&request.name, request.arguments, context)
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

struct PromptsListHandler {
    shared: Arc<ServerShared>,
    prompts: Arc<PromptRegistry>,
}

#[async_trait]
impl RequestHandler for PromptsListHandler {
    async fn handle(&self, params: Option<Value>, _context: RequestContext) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        let request: ListPromptsRequest = parse_params_or_default(params)?;
        let page = self.prompts.list(request.cursor.as_ref())?;
        Ok(serde_json::to_value(ListPromptsResponse {
            prompts: page.items,
            next_cursor: page.next_cursor,
        })?)
    }
}

struct PromptsGetHandler {
    shared: Arc<ServerShared>,
    prompts: Arc<PromptRegistry>,
}

#[async_trait]
impl RequestHandler for PromptsGetHandler {
    async fn handle(&self, params: Option<Value>, context: RequestContext) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
        let request: GetPromptRequest = serde_json::from_value(params)?;
        let result = self
            .prompts
            .get_prompt(&request.name, request.arguments, context)
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

#[derive(Clone, Copy)]
enum ResourceOperation {
    List,
    ListTemplates,
    Read,
    Subscribe,
    Unsubscribe,
}

struct ResourcesHandler {
    shared: Arc<ServerShared>,
    resources: Arc<ResourceRegistry>,
    operation: ResourceOperation,
}

#[async_trait]
impl RequestHandler for ResourcesHandler {
    async fn handle(&self, params: Option<Value>, context: RequestContext) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        match self.operation {
            ResourceOperation::List => {
                let request: ListResourcesRequest = parse_params_or_default(params)?;
                let page = self.resources.list(request.cursor.as_ref())?;
                Ok(serde_json::to_value(ListResourcesResponse {
                    resources: page.items,
                    next_cursor: page.next_cursor,
                })?)
            }
            ResourceOperation::ListTemplates => {
                let request: ListResourceTemplatesRequest = parse_params_or_default(params)?;
                let page = self.resources.list_templates(request.cursor.as_ref())?;
                Ok(serde_json::to_value(ListResourceTemplatesResponse {
                    resource_templates: page.items,
                    next_cursor: page.next_cursor,
                })?)
            }
            ResourceOperation::Read => {
                let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
                let request: ReadResourceRequest = serde_json::from_value(params)?;
                let result = self.resources.read(&request.uri, context).await?;
                Ok(serde_json::to_value(result)?)
            }
            ResourceOperation::Subscribe => {
                let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
                let request: SubscribeRequest = serde_json::from_value(params)?;
                let connection = context.session_id().unwrap_or(LOCAL_CONNECTION);
                self.resources.subscribe(request.uri.as_str(), connection);
                Ok(json!({}))
            }
            ResourceOperation::Unsubscribe => {
                let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
                let request: UnsubscribeRequest = serde_json::from_value(params)?;
                let connection = context.session_id().unwrap_or(LOCAL_CONNECTION);
                self.resources.unsubscribe(request.uri.as_str(), connection);
                Ok(json!({}))
            }
        }
    }
}

struct SetLevelHandler {
    shared: Arc<ServerShared>,
}

#[async_trait]
impl RequestHandler for SetLevelHandler {
    async fn handle(&self, params: Option<Value>, _context: RequestContext) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
        let request: SetLevelRequest = serde_json::from_value(params)?;
        if let Ok(mut level) = self.shared.log_level.write() {
            *level = Some(request.level);
        }
        Ok(json!({}))
    }
}

struct CompleteHandler {
    shared: Arc<ServerShared>,
    completion: Arc<dyn CompletionHandler>,
}

#[async_trait]
impl RequestHandler for CompleteHandler {
    async fn handle(&self, params: Option<Value>, context: RequestContext) -> McpResult<Value> {
        self.shared.ensure_operational()?;
        let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
        let request: CompleteRequest = serde_json::from_value(params)?;
        let result = self.completion.complete(request, context).await?;
        Ok(serde_json::to_value(result)?)
    }
}

fn parse_params_or_default<T>(params: Option<Value>) -> McpResult<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match params {
        None => Ok(T::default()),
        Some(Value::Null) => Ok(T::default()),
        Some(value) => Ok(serde_json::from_value(value)?),
    }
}

/// High-level MCP server session
pub struct ServerSession {
    config: ServerSessionConfig,
    transport: SharedTransport,
    engine: ProtocolEngine,
    shared: Arc<ServerShared>,
    tools: Option<Arc<ToolRegistry>>,
    prompts: Option<Arc<PromptRegistry>>,
    resources: Option<Arc<ResourceRegistry>>,
}

impl ServerSession {
    /// Start building a session
    pub fn builder() -> ServerSessionBuilder {
        ServerSessionBuilder::new()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Capabilities the client declared, once initialized
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.shared.client_capabilities()
    }

    /// Client identification, once initialized
    pub fn client_info(&self) -> Option<Implementation> {
        self.shared
            .client
            .read()
            .ok()
            .and_then(|c| c.as_ref().map(|(_, info)| info.clone()))
    }

    /// The attached tool registry, if any
    pub fn tools(&self) -> Option<&Arc<ToolRegistry>> {
        self.tools.as_ref()
    }

    /// The attached prompt registry, if any
    pub fn prompts(&self) -> Option<&Arc<PromptRegistry>> {
        self.prompts.as_ref()
    }

    /// The attached resource registry, if any
    pub fn resources(&self) -> Option<&Arc<ResourceRegistry>> {
        self.resources.as_ref()
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

    /// Liveness check
    pub async fn ping(&self) -> McpResult<()> {
        self.shared.ensure_operational()?;
        self.engine
            .request(methods::PING, None, self.request_options())
            .await?;
        Ok(())
    }

    /// Ask the client to run an LLM completion (`sampling/createMessage`)
    pub async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> McpResult<CreateMessageResponse> {
        self.shared.ensure_operational()?;
        gate::check_server_request(
            methods::SAMPLING_CREATE_MESSAGE,
            self.shared.client_capabilities().as_ref(),
            self.config.enforcement,
        )?;
        let result = self
            .engine
            .request(
                methods::SAMPLING_CREATE_MESSAGE,
                Some(serde_json::to_value(request)?),
                self.request_options(),
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Enumerate the client's roots (`roots/list`)
    pub async fn list_roots(&self) -> McpResult<ListRootsResponse> {
        self.shared.ensure_operational()?;
        gate::check_server_request(
            methods::ROOTS_LIST,
            self.shared.client_capabilities().as_ref(),
            self.config.enforcement,
        )?;
        let result = self
            .engine
            .request(methods::ROOTS_LIST, None, self.request_options())
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Emit a `notifications/message` log record, honoring the client's
    /// minimum level
    pub async fn log_message(&self, record: LoggingMessageNotification) -> McpResult<()> {
        self.shared.ensure_operational()?;
        gate::check_server_notification(notifications::MESSAGE, &self.shared.own_capabilities)?;
        let minimum = self.shared.log_level.read().ok().and_then(|l| *l);
        if let Some(minimum) = minimum {
            if record.level < minimum {
                return Ok(());
            }
        }
        self.engine
            .notify(notifications::MESSAGE, Some(serde_json::to_value(record)?))
            .await
    }

    /// Emit `notifications/tools/list_changed`
    pub async fn notify_tools_list_changed(&self) -> McpResult<()> {
        self.notify_gated(notifications::TOOLS_LIST_CHANGED, None).await
    }

    /// Emit `notifications/prompts/list_changed`
    pub async fn notify_prompts_list_changed(&self) -> McpResult<()> {
        self.notify_gated(notifications::PROMPTS_LIST_CHANGED, None).await
    }

    /// Emit `notifications/resources/list_changed`
    pub async fn notify_resources_list_changed(&self) -> McpResult<()> {
        self.notify_gated(notifications::RESOURCES_LIST_CHANGED, None)
            .await
    }

    /// Deliver `notifications/resources/updated` to every subscriber of
    /// the URI
    pub async fn notify_resource_updated(&self, uri: &str) -> McpResult<()> {
        self.shared.ensure_operational()?;
        gate::check_server_notification(
            notifications::RESOURCES_UPDATED,
            &self.shared.own_capabilities,
        )?;
        let Some(resources) = &self.resources else {
            return Err(McpError::invalid_request("session exposes no resources"));
        };
        let subscribers = resources.subscribers(uri);
        if subscribers.is_empty() {
            return Ok(());
        }
        let params = serde_json::to_value(ResourceUpdatedNotification {
            uri: crate::protocol::Uri::new_unchecked(uri),
        })?;
        // One notification per subscribed connection. A single-session
        // transport carries them all on the same wire.
        for connection in subscribers {
            debug!(uri, %connection, "resource updated");
            self.engine
                .notify(notifications::RESOURCES_UPDATED, Some(params.clone()))
                .await?;
        }
        Ok(())
    }

    async fn notify_gated(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.shared.ensure_operational()?;
        gate::check_server_notification(method, &self.shared.own_capabilities)?;
        self.engine.notify(method, params).await
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

    /// Wait until the session terminates (transport close or error)
    pub async fn wait_until_closed(&self) {
        let mut closed = self.engine.core().closed_watch();
        if *closed.borrow() {
            return;
        }
        while closed.changed().await.is_ok() {
            if *closed.borrow() {
                return;
            }
        }
    }
}
