//! Streamable HTTP Transport
//!
//! Server and client sides of the MCP streamable HTTP transport: POSTed
//! JSON-RPC with SSE (or single-shot JSON) answers, an optional standalone
//! GET stream for server-initiated traffic, session correlation via the
//! `Mcp-Session-Id` header, and `Last-Event-ID` resumption backed by a
//! pluggable [`EventStore`].

pub mod client;
pub mod config;
pub mod event_store;
pub mod server;
pub mod sse;

pub use client::{HttpClientTransport, HttpClientTransportBuilder};
pub use config::{HttpClientConfig, HttpServerConfig, SessionIdGenerator};
pub use event_store::{EventStore, InMemoryEventStore};
pub use server::{
    HttpServerTransport, HttpServerTransportBuilder, LAST_EVENT_ID_HEADER, MCP_SESSION_ID_HEADER,
};
pub use sse::{SseEvent, SseParser};
