//! Protocol Foundation
//!
//! The JSON-RPC 2.0 codec, MCP domain types, per-feature message shapes,
//! protocol constants, and validation errors. Everything above this module
//! (transports, engine, sessions, registries) is built from these types.

pub mod constants;
pub mod errors;
pub mod message;
pub mod messages;
pub mod types;

// Codec
pub use message::{
    JsonRpcError, JsonRpcMessage, JsonRpcMessageTrait, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, JSONRPC_VERSION, MAX_SAFE_INTEGER_ID,
};

// Validation errors
pub use errors::{ProtocolError, ProtocolResult};

// Domain types
pub use types::{
    Annotations, Base64Data, ClientCapabilities, CompletionsCapability, Content, Cursor,
    Implementation, LogLevel, LoggingCapability, MimeType, ProgressToken, PromptsCapability,
    ProtocolVersion, ResourceContents, ResourcesCapability, Role, RootsCapability,
    SamplingCapability, ServerCapabilities, ToolsCapability, Uri,
};

// Message shapes
pub use messages::{
    CallToolRequest, CallToolResponse, CancelledNotification, CompleteRequest, CompleteResponse,
    Completion, CompletionArgument, CompletionReference, CreateMessageRequest,
    CreateMessageResponse, GetPromptRequest, GetPromptResponse, InitializeRequest,
    InitializeResponse, ListPromptsRequest, ListPromptsResponse, ListResourceTemplatesRequest,
    ListResourceTemplatesResponse, ListResourcesRequest, ListResourcesResponse, ListRootsResponse,
    ListToolsRequest, ListToolsResponse, LoggingMessageNotification, ModelHint, ModelPreferences,
    ProgressNotification, Prompt, PromptArgument, PromptMessage, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceTemplate, ResourceUpdatedNotification, Root,
    SamplingMessage, SetLevelRequest, SubscribeRequest, Tool, ToolAnnotations, UnsubscribeRequest,
};
