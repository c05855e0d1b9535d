//! Stdio Transports
//!
//! Newline-delimited JSON over standard streams. The server role reads
//! stdin and writes stdout; the client role spawns a child process with
//! its stdio piped, optionally capturing stderr out of band.

pub mod client;
pub mod transport;

pub use client::{StdioClientTransport, StdioClientTransportBuilder, StderrLineCallback};
pub use transport::{StdioTransport, StdioTransportBuilder};
