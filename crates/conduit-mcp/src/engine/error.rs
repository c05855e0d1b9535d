//! Canonical MCP Error Model
//!
//! [`McpError`] is the error type every request path surfaces: handler
//! failures, capability violations, timeouts, cancellation, and transport
//! faults all converge here, each mapping to one canonical JSON-RPC code.

// Layer 2: Third-party crate imports
use serde_json::Value;
use thiserror::Error;

// Layer 3: Internal module imports
use crate::correlation::CorrelationError;
use crate::protocol::constants::error_codes;
use crate::protocol::{JsonRpcError, ProtocolError};
use crate::transport::TransportError;

/// Result alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Canonical error for every MCP request path
#[derive(Error, Debug)]
pub enum McpError {
    /// Malformed JSON on an inbound request (-32700)
    #[error("parse error: {message}")]
    ParseError { message: String },

    /// Structurally invalid JSON-RPC or lifecycle violation (-32600)
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// No handler for the requested method (-32601)
    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    /// Params failed validation (-32602)
    #[error("invalid params: {message}")]
    InvalidParams { message: String },

    /// Unhandled fault inside a handler (-32603)
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Transport closed while a request was pending (-32000)
    #[error("connection closed")]
    ConnectionClosed,

    /// Per-request or total timeout elapsed (-32001)
    #[error("request timed out after {elapsed_ms}ms")]
    RequestTimeout { elapsed_ms: u64 },

    /// The request was cancelled before completion
    #[error("request cancelled{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Cancelled { reason: Option<String> },

    /// A capability required for this method was not negotiated
    #[error("capability not negotiated for {method}: {detail}")]
    CapabilityNotSupported { method: String, detail: String },

    /// The peer answered with a JSON-RPC error
    #[error("remote error: {error}")]
    Remote { error: JsonRpcError },

    /// Underlying transport failure
    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: TransportError,
    },
}

impl McpError {
    /// Parse-error constructor
    pub fn parse_error(message: impl Into<String>) -> Self {
        McpError::ParseError {
            message: message.into(),
        }
    }

    /// Invalid-request constructor
    pub fn invalid_request(message: impl Into<String>) -> Self {
        McpError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Method-not-found constructor
    pub fn method_not_found(method: impl Into<String>) -> Self {
        McpError::MethodNotFound {
            method: method.into(),
        }
    }

    /// Invalid-params constructor
    pub fn invalid_params(message: impl Into<String>) -> Self {
        McpError::InvalidParams {
            message: message.into(),
        }
    }

    /// Internal-error constructor
    pub fn internal(message: impl Into<String>) -> Self {
        McpError::Internal {
            message: message.into(),
        }
    }

    /// Capability-gate constructor
    pub fn capability_not_supported(
        method: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        McpError::CapabilityNotSupported {
            method: method.into(),
            detail: detail.into(),
        }
    }

    /// The canonical JSON-RPC code for this error
    pub fn code(&self) -> i32 {
        match self {
            McpError::ParseError { .. } => error_codes::PARSE_ERROR,
            McpError::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams { .. } => error_codes::INVALID_PARAMS,
            McpError::Internal { .. } => error_codes::INTERNAL_ERROR,
            McpError::ConnectionClosed => error_codes::CONNECTION_CLOSED,
            McpError::RequestTimeout { .. } => error_codes::REQUEST_TIMEOUT,
            // Local-only outcomes reuse the nearest canonical code when
            // they must cross the wire.
            McpError::Cancelled { .. } => error_codes::INVALID_REQUEST,
            McpError::CapabilityNotSupported { .. } => error_codes::INVALID_REQUEST,
            McpError::Remote { error } => error.code,
            McpError::Transport { .. } => error_codes::INTERNAL_ERROR,
        }
    }

    /// Structured detail carried on the wire, if any
    pub fn data(&self) -> Option<Value> {
        match self {
            McpError::Remote { error } => error.data.clone(),
            _ => None,
        }
    }

    /// Render as a JSON-RPC error object
    pub fn to_json_rpc_error(&self) -> JsonRpcError {
        JsonRpcError::new(self.code(), self.to_string(), self.data())
    }
}

impl From<CorrelationError> for McpError {
    fn from(error: CorrelationError) -> Self {
        match error {
            CorrelationError::Timeout { elapsed_ms, .. } => {
                McpError::RequestTimeout { elapsed_ms }
            }
            CorrelationError::TotalTimeout { limit_ms, .. } => McpError::RequestTimeout {
                elapsed_ms: limit_ms,
            },
            CorrelationError::Cancelled { reason, .. } => McpError::Cancelled { reason },
            CorrelationError::ConnectionClosed { .. } => McpError::ConnectionClosed,
            CorrelationError::Remote { error } => McpError::Remote { error },
            other => McpError::internal(other.to_string()),
        }
    }
}

impl From<ProtocolError> for McpError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::MalformedFrame { .. } => McpError::parse_error(error.to_string()),
            other => McpError::invalid_request(other.to_string()),
        }
    }
}

impl From<JsonRpcError> for McpError {
    fn from(error: JsonRpcError) -> Self {
        McpError::Remote { error }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(error: serde_json::Error) -> Self {
        McpError::invalid_params(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_canonical_table() {
        assert_eq!(McpError::parse_error("x").code(), -32700);
        assert_eq!(McpError::invalid_request("x").code(), -32600);
        assert_eq!(McpError::method_not_found("m").code(), -32601);
        assert_eq!(McpError::invalid_params("x").code(), -32602);
        assert_eq!(McpError::internal("x").code(), -32603);
        assert_eq!(McpError::ConnectionClosed.code(), -32000);
        assert_eq!(McpError::RequestTimeout { elapsed_ms: 1 }.code(), -32001);
    }

    #[test]
    fn remote_error_preserves_code_and_data() {
        let remote = McpError::from(JsonRpcError::new(
            -32042,
            "custom",
            Some(serde_json::json!({"k": 1})),
        ));
        let wire = remote.to_json_rpc_error();
        assert_eq!(wire.code, -32042);
        assert_eq!(wire.data, Some(serde_json::json!({"k": 1})));
    }

    #[test]
    fn correlation_errors_map_to_canonical() {
        use crate::protocol::RequestId;
        let timeout: McpError = CorrelationError::Timeout {
            id: RequestId::Number(1),
            elapsed_ms: 100,
        }
        .into();
        assert_eq!(timeout.code(), -32001);

        let closed: McpError = CorrelationError::ConnectionClosed {
            id: RequestId::Number(1),
        }
        .into();
        assert_eq!(closed.code(), -32000);
    }
}
