//! Conduit MCP - Model Context Protocol Runtime
//!
//! A bidirectional runtime for the Model Context Protocol (MCP) built on a
//! JSON-RPC 2.0 foundation: both the client and server sides of the
//! protocol over stdio, streamable HTTP, and in-memory transports.
//!
//! # Architecture
//!
//! The implementation is organized in layers:
//!
//! - **Protocol Layer** (`protocol`): JSON-RPC 2.0 codec, MCP domain
//!   types, per-feature message shapes, canonical constants
//! - **Transport Layer** (`transport`): framing and delivery of JSON
//!   messages with connection lifecycle and SSE resumption
//! - **Correlation Layer** (`correlation`): pending-request table with
//!   timeout policy
//! - **Engine Layer** (`engine`): request/response correlation, handler
//!   dispatch, progress routing, cancellation
//! - **Session Layer** (`session`): initialization handshake, capability
//!   gate, typed request APIs for both roles
//! - **Registry Layer** (`registry`): tools, prompts, resources (concrete
//!   and templated, with subscriptions), and roots
//!
//! # Quick Start
//!
//! A server and client wired through the in-memory transport pair:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use conduit_mcp::registry::{ToolHandler, ToolRegistry};
//! use conduit_mcp::protocol::{CallToolResponse, Tool};
//! use conduit_mcp::session::{ClientSession, ServerSession};
//! use conduit_mcp::transport::inmemory::InMemoryTransport;
//! use conduit_mcp::engine::{McpResult, RequestContext};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ToolHandler for Echo {
//!     async fn call(
//!         &self,
//!         arguments: Option<serde_json::Value>,
//!         _context: RequestContext,
//!     ) -> McpResult<CallToolResponse> {
//!         Ok(CallToolResponse::text(
//!             arguments.map(|a| a.to_string()).unwrap_or_default(),
//!         ))
//!     }
//! }
//!
//! # async fn example() -> McpResult<()> {
//! let tools = Arc::new(ToolRegistry::new());
//! tools.add(Tool::new("echo", json!({"type": "object"})), Arc::new(Echo));
//!
//! let (client_end, server_end) = InMemoryTransport::pair();
//! let server = ServerSession::builder()
//!     .server_info("example-server", "1.0.0")
//!     .tools(Arc::clone(&tools))
//!     .serve(server_end)
//!     .await?;
//! let client = ClientSession::builder()
//!     .client_info("example-client", "1.0.0")
//!     .connect(client_end)
//!     .await?;
//!
//! let result = client.call_tool("echo", Some(json!({"hello": "world"}))).await?;
//! assert!(!result.is_error());
//! # client.close().await?;
//! # server.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod correlation;
pub mod engine;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

// Protocol foundation at the crate root for ergonomic imports
pub use protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcMessageTrait, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId,
};

// High-level API
pub use engine::{McpError, McpResult, OutgoingRequestOptions, ProtocolEngine, RequestContext};
pub use session::{
    ClientSession, ClientSessionBuilder, EnforcementMode, ServerSession, ServerSessionBuilder,
    SessionState,
};
pub use transport::{Transport, TransportBuilder, TransportError};
