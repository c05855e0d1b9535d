//! End-to-end session tests over the in-memory transport pair: handshake,
//! tools with structured output, templated resources, subscriptions,
//! prompts, roots, sampling, completion, logging, and the capability gate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use conduit_mcp::engine::{McpError, McpResult, RequestContext};
use conduit_mcp::protocol::{
    CallToolResponse, CompleteResponse, Completion, CompletionArgument, CompletionReference,
    Content, CreateMessageRequest, CreateMessageResponse, GetPromptResponse, LogLevel,
    LoggingMessageNotification, MimeType, Prompt, PromptArgument, PromptMessage,
    ReadResourceResponse, Resource, ResourceContents, ResourceTemplate, Role, Root, Tool, Uri,
};
use conduit_mcp::registry::{
    PromptHandler, PromptRegistry, ResourceHandler, ResourceRegistry, RootRegistry, ToolHandler,
    ToolRegistry,
};
use conduit_mcp::session::{
    ClientSession, ClientSessionBuilder, CompletionHandler, SamplingHandler, ServerSession,
    ServerSessionBuilder, SessionState,
};
use conduit_mcp::transport::inmemory::InMemoryTransport;

// -- fixtures ----------------------------------------------------------------

struct AddTool;

#[async_trait]
impl ToolHandler for AddTool {
    async fn call(
        &self,
        arguments: Option<Value>,
        _context: RequestContext,
    ) -> McpResult<CallToolResponse> {
        let args = arguments.ok_or_else(|| McpError::invalid_params("missing arguments"))?;
        let a = args["a"]
            .as_f64()
            .ok_or_else(|| McpError::invalid_params("a must be a number"))?;
        let b = args["b"]
            .as_f64()
            .ok_or_else(|| McpError::invalid_params("b must be a number"))?;
        let sum = a + b;
        Ok(CallToolResponse::text(format!("{sum}")).with_structured(json!({"sum": sum})))
    }
}

/// Declares an output schema but "forgets" structuredContent.
struct ForgetfulTool;

#[async_trait]
impl ToolHandler for ForgetfulTool {
    async fn call(
        &self,
        _arguments: Option<Value>,
        _context: RequestContext,
    ) -> McpResult<CallToolResponse> {
        Ok(CallToolResponse::text("no structure here"))
    }
}

struct ProfileResource;

#[async_trait]
impl ResourceHandler for ProfileResource {
    async fn read(
        &self,
        uri: &Uri,
        variables: &HashMap<String, String>,
        _context: RequestContext,
    ) -> McpResult<ReadResourceResponse> {
        let user = variables
            .get("userId")
            .ok_or_else(|| McpError::invalid_params("missing userId"))?;
        Ok(ReadResourceResponse {
            contents: vec![ResourceContents::text_with_mime(
                uri.clone(),
                MimeType::new("application/json").map_err(|e| McpError::internal(e.to_string()))?,
                format!("{{\"name\":\"user-{user}\"}}"),
            )],
        })
    }
}

struct DataResource;

#[async_trait]
impl ResourceHandler for DataResource {
    async fn read(
        &self,
        uri: &Uri,
        _variables: &HashMap<String, String>,
        _context: RequestContext,
    ) -> McpResult<ReadResourceResponse> {
        Ok(ReadResourceResponse {
            contents: vec![ResourceContents::text(uri.clone(), "hello")],
        })
    }
}

struct GreetPrompt;

#[async_trait]
impl PromptHandler for GreetPrompt {
    async fn resolve(
        &self,
        arguments: Option<HashMap<String, String>>,
        _context: RequestContext,
    ) -> McpResult<GetPromptResponse> {
        let name = arguments
            .and_then(|args| args.get("name").cloned())
            .unwrap_or_default();
        Ok(GetPromptResponse {
            description: Some("greeting".to_string()),
            messages: vec![PromptMessage::user(Content::text(format!("Hi {name}!")))],
        })
    }
}

struct EchoSampling;

#[async_trait]
impl SamplingHandler for EchoSampling {
    async fn create_message(
        &self,
        request: CreateMessageRequest,
        _context: RequestContext,
    ) -> McpResult<CreateMessageResponse> {
        let last = request
            .messages
            .last()
            .and_then(|m| m.content.as_text())
            .unwrap_or_default();
        Ok(CreateMessageResponse {
            role: Role::Assistant,
            content: Content::text(format!("echo: {last}")),
            model: "test-model".to_string(),
            stop_reason: Some("endTurn".to_string()),
        })
    }
}

struct StaticCompletion;

#[async_trait]
impl CompletionHandler for StaticCompletion {
    async fn complete(
        &self,
        request: conduit_mcp::protocol::CompleteRequest,
        _context: RequestContext,
    ) -> McpResult<CompleteResponse> {
        let prefix = request.argument.value;
        Ok(CompleteResponse {
            completion: Completion {
                values: vec![format!("{prefix}-one"), format!("{prefix}-two")],
                total: Some(2),
                has_more: Some(false),
            },
        })
    }
}

fn tool_registry() -> Arc<ToolRegistry> {
    let tools = Arc::new(ToolRegistry::new());
    tools.add(
        Tool::new(
            "add",
            json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }),
        )
        .with_output_schema(json!({
            "type": "object",
            "properties": {"sum": {"type": "number"}},
            "required": ["sum"]
        })),
        Arc::new(AddTool),
    );
    tools.add(
        Tool::new("forgetful", json!({"type": "object"}))
            .with_output_schema(json!({"type": "object"})),
        Arc::new(ForgetfulTool),
    );
    tools
}

fn resource_registry() -> Arc<ResourceRegistry> {
    let resources = Arc::new(ResourceRegistry::new());
    resources.add(
        Resource::new(Uri::new("file:///data.txt").unwrap(), "data"),
        Arc::new(DataResource),
    );
    resources
        .add_template(
            ResourceTemplate::new("users://{userId}/profile", "profiles"),
            Arc::new(ProfileResource),
        )
        .unwrap();
    resources
}

fn prompt_registry() -> Arc<PromptRegistry> {
    let prompts = Arc::new(PromptRegistry::new());
    prompts.add(
        Prompt::new("greet").with_arguments(vec![PromptArgument::required("name")]),
        Arc::new(GreetPrompt),
    );
    prompts
}

struct Harness {
    client: ClientSession,
    server: ServerSession,
}

async fn connect(
    server_builder: ServerSessionBuilder,
    client_builder: ClientSessionBuilder,
) -> Harness {
    let (client_end, server_end) = InMemoryTransport::pair();
    let server = server_builder.serve(server_end).await.unwrap();
    let client = client_builder.connect(client_end).await.unwrap();
    // The initialized notification travels asynchronously; wait for the
    // server to observe it before tests drive server-initiated traffic.
    wait_for(|| server.state() == SessionState::Operating).await;
    Harness { client, server }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// -- scenarios ---------------------------------------------------------------

#[tokio::test]
async fn initialize_handshake_reaches_operating() {
    let harness = connect(
        ServerSession::builder()
            .server_info("ExampleServer", "1.0.0")
            .instructions("be nice")
            .tools(tool_registry())
            .resources(resource_registry()),
        ClientSession::builder().client_info("ExampleClient", "1.0.0"),
    )
    .await;

    assert_eq!(harness.client.state(), SessionState::Operating);
    let info = harness.client.server_info().unwrap();
    assert_eq!(info.name, "ExampleServer");
    assert_eq!(harness.client.instructions().as_deref(), Some("be nice"));

    let capabilities = harness.client.server_capabilities().unwrap();
    assert!(capabilities.tools.is_some());
    assert_eq!(
        capabilities.resources.as_ref().and_then(|r| r.subscribe),
        Some(true)
    );
    assert!(capabilities.prompts.is_none());

    wait_for(|| harness.server.state() == SessionState::Operating).await;
    assert_eq!(
        harness.server.client_info().unwrap().name,
        "ExampleClient"
    );

    harness.client.ping().await.unwrap();
    harness.server.ping().await.unwrap();

    harness.client.close().await.unwrap();
}

#[tokio::test]
async fn tool_call_returns_structured_content() {
    let harness = connect(
        ServerSession::builder().tools(tool_registry()),
        ClientSession::builder(),
    )
    .await;

    let listed = harness.client.list_tools(None).await.unwrap();
    assert_eq!(listed.tools.len(), 2);
    assert!(listed.next_cursor.is_none());

    let result = harness
        .client
        .call_tool("add", Some(json!({"a": 2, "b": 3})))
        .await
        .unwrap();
    assert!(!result.is_error());
    assert_eq!(result.structured_content, Some(json!({"sum": 5.0})));
    assert_eq!(result.content[0].as_text(), Some("5"));
}

#[tokio::test]
async fn missing_structured_content_rejected_by_caller() {
    let harness = connect(
        ServerSession::builder().tools(tool_registry()),
        ClientSession::builder(),
    )
    .await;

    // Prime the output-schema cache.
    harness.client.list_tools(None).await.unwrap();
    let error = harness
        .client
        .call_tool("forgetful", None)
        .await
        .unwrap_err();
    assert!(matches!(error, McpError::InvalidParams { .. }));
}

#[tokio::test]
async fn tool_level_failure_is_not_a_protocol_error() {
    let harness = connect(
        ServerSession::builder().tools(tool_registry()),
        ClientSession::builder(),
    )
    .await;

    let result = harness
        .client
        .call_tool("add", Some(json!({"a": "NaN"})))
        .await
        .unwrap();
    assert!(result.is_error());

    // Unknown tool, by contrast, is a JSON-RPC error.
    let error = harness.client.call_tool("missing", None).await.unwrap_err();
    match error {
        McpError::Remote { error } => assert_eq!(error.code, -32602),
        other => panic!("expected remote invalid-params, got {other}"),
    }
}

#[tokio::test]
async fn templated_resource_read_extracts_variables() {
    let harness = connect(
        ServerSession::builder().resources(resource_registry()),
        ClientSession::builder(),
    )
    .await;

    let result = harness
        .client
        .read_resource(Uri::new("users://42/profile").unwrap())
        .await
        .unwrap();
    match &result.contents[0] {
        ResourceContents::Text {
            uri,
            mime_type,
            text,
        } => {
            assert_eq!(uri.as_str(), "users://42/profile");
            assert_eq!(mime_type.as_ref().map(|m| m.as_str()), Some("application/json"));
            assert_eq!(text, "{\"name\":\"user-42\"}");
        }
        other => panic!("unexpected contents: {other:?}"),
    }

    let templates = harness.client.list_resource_templates(None).await.unwrap();
    assert_eq!(
        templates.resource_templates[0].uri_template,
        "users://{userId}/profile"
    );
}

#[tokio::test]
async fn subscription_delivers_exactly_one_update_per_change() {
    let updates = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&updates);

    let harness = connect(
        ServerSession::builder().resources(resource_registry()),
        ClientSession::builder().on_resource_updated(Arc::new(move |notification| {
            assert_eq!(notification.uri.as_str(), "file:///data.txt");
            seen.fetch_add(1, Ordering::SeqCst);
        })),
    )
    .await;

    let uri = Uri::new("file:///data.txt").unwrap();
    harness.client.subscribe_resource(uri.clone()).await.unwrap();
    harness
        .server
        .notify_resource_updated("file:///data.txt")
        .await
        .unwrap();
    wait_for(|| updates.load(Ordering::SeqCst) == 1).await;

    harness
        .client
        .unsubscribe_resource(uri.clone())
        .await
        .unwrap();
    harness
        .server
        .notify_resource_updated("file:///data.txt")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    // Unsubscribing again still succeeds.
    harness.client.unsubscribe_resource(uri).await.unwrap();
}

#[tokio::test]
async fn prompt_resolution_and_required_arguments() {
    let harness = connect(
        ServerSession::builder().prompts(prompt_registry()),
        ClientSession::builder(),
    )
    .await;

    let listed = harness.client.list_prompts(None).await.unwrap();
    assert_eq!(listed.prompts[0].name, "greet");

    let mut arguments = HashMap::new();
    arguments.insert("name".to_string(), "Ada".to_string());
    let resolved = harness
        .client
        .get_prompt("greet", Some(arguments))
        .await
        .unwrap();
    assert_eq!(resolved.messages[0].content.as_text(), Some("Hi Ada!"));

    let error = harness.client.get_prompt("greet", None).await.unwrap_err();
    match error {
        McpError::Remote { error } => assert_eq!(error.code, -32602),
        other => panic!("expected invalid params, got {other}"),
    }
}

#[tokio::test]
async fn roots_enumerated_by_server() {
    let roots = Arc::new(RootRegistry::new());
    roots
        .add(Root::new(Uri::new("file:///workspace").unwrap(), "workspace"))
        .unwrap();
    let changes = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&changes);

    let harness = connect(
        ServerSession::builder().on_roots_list_changed(Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })),
        ClientSession::builder().roots(Arc::clone(&roots)),
    )
    .await;

    let listed = harness.server.list_roots().await.unwrap();
    assert_eq!(listed.roots.len(), 1);
    assert_eq!(listed.roots[0].uri.as_str(), "file:///workspace");

    harness
        .client
        .add_root(Root::new(Uri::new("file:///other").unwrap(), "other"))
        .await
        .unwrap();
    wait_for(|| changes.load(Ordering::SeqCst) == 1).await;
    let listed = harness.server.list_roots().await.unwrap();
    assert_eq!(listed.roots.len(), 2);
}

#[tokio::test]
async fn sampling_round_trip() {
    let harness = connect(
        ServerSession::builder(),
        ClientSession::builder().sampling_handler(Arc::new(EchoSampling)),
    )
    .await;

    let response = harness
        .server
        .create_message(CreateMessageRequest {
            messages: vec![conduit_mcp::protocol::SamplingMessage {
                role: Role::User,
                content: Content::text("hello"),
            }],
            model_preferences: None,
            system_prompt: None,
            include_context: None,
            temperature: None,
            max_tokens: 64,
            stop_sequences: None,
            metadata: None,
        })
        .await
        .unwrap();
    assert_eq!(response.content.as_text(), Some("echo: hello"));
    assert_eq!(response.model, "test-model");
}

#[tokio::test]
async fn completion_round_trip() {
    let harness = connect(
        ServerSession::builder()
            .prompts(prompt_registry())
            .completion_handler(Arc::new(StaticCompletion)),
        ClientSession::builder(),
    )
    .await;

    let response = harness
        .client
        .complete(
            CompletionReference::Prompt {
                name: "greet".to_string(),
            },
            CompletionArgument {
                name: "name".to_string(),
                value: "Ad".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(response.completion.values, vec!["Ad-one", "Ad-two"]);
}

#[tokio::test]
async fn logging_honors_minimum_level() {
    let records = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&records);

    let harness = connect(
        ServerSession::builder().logging(),
        ClientSession::builder().on_log_message(Arc::new(move |_record| {
            seen.fetch_add(1, Ordering::SeqCst);
        })),
    )
    .await;

    harness
        .client
        .set_log_level(LogLevel::Warning)
        .await
        .unwrap();
    harness
        .server
        .log_message(LoggingMessageNotification::new(
            LogLevel::Info,
            json!("too quiet"),
        ))
        .await
        .unwrap();
    harness
        .server
        .log_message(LoggingMessageNotification::new(
            LogLevel::Error,
            json!("loud enough"),
        ))
        .await
        .unwrap();

    wait_for(|| records.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn capability_gate_blocks_undeclared_requests_locally() {
    // Server declares no prompt support; strict client refuses to ask.
    let harness = connect(
        ServerSession::builder().tools(tool_registry()),
        ClientSession::builder(),
    )
    .await;

    let error = harness.client.list_prompts(None).await.unwrap_err();
    assert!(matches!(error, McpError::CapabilityNotSupported { .. }));

    // Sampling without a client handler is likewise refused server-side.
    let error = harness
        .server
        .create_message(CreateMessageRequest {
            messages: Vec::new(),
            model_preferences: None,
            system_prompt: None,
            include_context: None,
            temperature: None,
            max_tokens: 1,
            stop_sequences: None,
            metadata: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(error, McpError::CapabilityNotSupported { .. }));
}

#[tokio::test]
async fn list_changed_notifications_reach_the_client() {
    let changes = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&changes);

    let harness = connect(
        ServerSession::builder().tools(tool_registry()),
        ClientSession::builder().on_tools_list_changed(Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        })),
    )
    .await;

    harness.server.notify_tools_list_changed().await.unwrap();
    wait_for(|| changes.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn paginated_tool_listing_walks_all_pages() {
    let tools = Arc::new(ToolRegistry::with_page_size(2));
    for name in ["a", "b", "c", "d", "e"] {
        tools.add(Tool::new(name, json!({"type": "object"})), Arc::new(AddTool));
    }

    let harness = connect(
        ServerSession::builder().tools(tools),
        ClientSession::builder(),
    )
    .await;

    let mut names = Vec::new();
    let mut cursor = None;
    loop {
        let page = harness.client.list_tools(cursor).await.unwrap();
        names.extend(page.tools.into_iter().map(|t| t.name));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn shutdown_terminates_both_sides() {
    let harness = connect(
        ServerSession::builder().tools(tool_registry()),
        ClientSession::builder(),
    )
    .await;

    harness.client.close().await.unwrap();
    assert_eq!(harness.client.state(), SessionState::Terminated);
    wait_for(|| harness.server.state() == SessionState::Terminated).await;

    // Further requests fail without touching the wire.
    let error = harness.client.ping().await.unwrap_err();
    assert!(matches!(error, McpError::InvalidRequest { .. }));
}
