//! MCP Message Shapes
//!
//! One module per protocol feature, containing the request/response
//! parameter structures exactly as they appear on the wire. The protocol
//! engine moves raw `serde_json::Value` params; these types give sessions
//! and handlers their typed views.

pub mod completion;
pub mod initialization;
pub mod logging;
pub mod notifications;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

pub use completion::{
    CompleteRequest, CompleteResponse, Completion, CompletionArgument, CompletionReference,
};
pub use initialization::{InitializeRequest, InitializeResponse};
pub use logging::{LoggingMessageNotification, SetLevelRequest};
pub use notifications::{CancelledNotification, ProgressNotification, ResourceUpdatedNotification};
pub use prompts::{
    GetPromptRequest, GetPromptResponse, ListPromptsRequest, ListPromptsResponse, Prompt,
    PromptArgument, PromptMessage,
};
pub use resources::{
    ListResourceTemplatesRequest, ListResourceTemplatesResponse, ListResourcesRequest,
    ListResourcesResponse, ReadResourceRequest, ReadResourceResponse, Resource, ResourceTemplate,
    SubscribeRequest, UnsubscribeRequest,
};
pub use roots::{ListRootsResponse, Root};
pub use sampling::{
    CreateMessageRequest, CreateMessageResponse, ModelHint, ModelPreferences, SamplingMessage,
};
pub use tools::{
    CallToolRequest, CallToolResponse, ListToolsRequest, ListToolsResponse, Tool, ToolAnnotations,
};
