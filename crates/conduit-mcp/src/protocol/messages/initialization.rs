//! MCP Protocol Initialization Messages
//!
//! Message types for the initialize request/response handshake and
//! capability negotiation. This is the first exchange in the protocol
//! lifecycle; see [`crate::session`] for the state machine that drives it.

use serde::{Deserialize, Serialize};

use crate::protocol::types::{
    ClientCapabilities, Implementation, ProtocolVersion, ServerCapabilities,
};

/// Initialize request for the MCP protocol handshake
///
/// Sent by the client to initiate the connection and negotiate
/// capabilities.
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::protocol::{ClientCapabilities, Implementation, InitializeRequest};
///
/// let request = InitializeRequest::new(
///     ClientCapabilities::default(),
///     Implementation::new("example-client", "1.0.0"),
/// );
/// assert_eq!(request.protocol_version.as_str(), "2025-03-26");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializeRequest {
    /// Protocol version being requested
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,

    /// Client capabilities
    pub capabilities: ClientCapabilities,

    /// Client identification
    #[serde(rename = "clientInfo")]
    pub client_info: Implementation,
}

impl InitializeRequest {
    /// Create a new initialize request for the latest protocol version
    pub fn new(capabilities: ClientCapabilities, client_info: Implementation) -> Self {
        Self {
            protocol_version: ProtocolVersion::latest(),
            capabilities,
            client_info,
        }
    }
}

/// Initialize response completing the handshake
///
/// The server echoes the requested protocol version when it supports it,
/// otherwise it answers with the latest version it does support and the
/// client decides whether to continue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializeResponse {
    /// Protocol version the server selected
    #[serde(rename = "protocolVersion")]
    pub protocol_version: ProtocolVersion,

    /// Server capabilities
    pub capabilities: ServerCapabilities,

    /// Server identification
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,

    /// Optional usage instructions for the client host application
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl InitializeResponse {
    /// Create a new initialize response
    pub fn new(
        protocol_version: ProtocolVersion,
        capabilities: ServerCapabilities,
        server_info: Implementation,
        instructions: Option<String>,
    ) -> Self {
        Self {
            protocol_version,
            capabilities,
            server_info,
            instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initialize_request_wire_shape() {
        let request = InitializeRequest::new(
            ClientCapabilities::full(),
            Implementation::new("ExampleClient", "1.0.0"),
        );
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["protocolVersion"], json!("2025-03-26"));
        assert_eq!(wire["clientInfo"]["name"], json!("ExampleClient"));
        assert_eq!(wire["capabilities"]["roots"]["listChanged"], json!(true));
    }

    #[test]
    fn initialize_response_round_trip() {
        let wire = json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {"tools": {"listChanged": true}, "resources": {"subscribe": true}},
            "serverInfo": {"name": "ExampleServer", "version": "1.0.0"}
        });
        let response: InitializeResponse = serde_json::from_value(wire.clone()).unwrap();
        assert!(response.capabilities.tools.is_some());
        assert!(response.instructions.is_none());
        assert_eq!(serde_json::to_value(&response).unwrap(), wire);
    }
}
