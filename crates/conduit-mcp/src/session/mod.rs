//! Session Layer
//!
//! A session is the stateful relationship between one client and one
//! server, from initialization to shutdown. The session drives the
//! handshake, enforces the capability gate, exposes the typed
//! request/notification API, and owns the transport plus protocol engine
//! for its connection.

// Layer 1: Standard library imports
use std::fmt;

pub mod client;
pub mod gate;
pub mod server;

pub use client::{ClientSession, ClientSessionBuilder, SamplingHandler};
pub use gate::EnforcementMode;
pub use server::{CompletionHandler, ServerSession, ServerSessionBuilder};

/// Lifecycle state of a session
///
/// Only `Operating` carries arbitrary traffic; `Initializing` accepts only
/// the handshake exchange; `Terminated` and `Error` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport attached
    Disconnected,
    /// Transport starting
    Connecting,
    /// Handshake in progress
    Initializing,
    /// Handshake complete, awaiting the initialized notification
    /// (server role) or about to send it (client role)
    Initialized,
    /// Fully operational
    Operating,
    /// Orderly shutdown in progress
    ShuttingDown,
    /// Session over; no further traffic possible
    Terminated,
    /// Session failed; no further traffic possible
    Error,
}

impl SessionState {
    /// Whether the session can carry feature traffic
    pub fn is_operational(&self) -> bool {
        matches!(self, SessionState::Operating | SessionState::ShuttingDown)
    }

    /// Whether the state accepts no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Initializing => "initializing",
            SessionState::Initialized => "initialized",
            SessionState::Operating => "operating",
            SessionState::ShuttingDown => "shutting-down",
            SessionState::Terminated => "terminated",
            SessionState::Error => "error",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operational_and_terminal_states() {
        assert!(SessionState::Operating.is_operational());
        assert!(SessionState::ShuttingDown.is_operational());
        assert!(!SessionState::Initializing.is_operational());
        assert!(SessionState::Terminated.is_terminal());
        assert!(SessionState::Error.is_terminal());
        assert!(!SessionState::Operating.is_terminal());
    }
}
