//! Protocol-level Error Types
//!
//! Validation errors for JSON-RPC envelopes and MCP domain newtypes.
//! Higher layers translate these into canonical wire errors; see
//! [`crate::engine::McpError`] for the request-path error model.

// Layer 2: Third-party crate imports
use thiserror::Error;

/// Result alias for protocol-layer validation
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while validating protocol types and envelopes
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A frame failed JSON parsing
    #[error("malformed JSON frame: {source}")]
    MalformedFrame {
        /// Underlying serde error
        #[source]
        source: serde_json::Error,
    },

    /// A frame parsed as JSON but is not valid JSON-RPC 2.0
    #[error("invalid JSON-RPC envelope: {reason}")]
    InvalidEnvelope { reason: String },

    /// Protocol version string is not YYYY-MM-DD
    #[error("invalid protocol version: {0}")]
    InvalidProtocolVersion(String),

    /// URI failed validation
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// URI template failed validation
    #[error("invalid URI template: {0}")]
    InvalidUriTemplate(String),

    /// MIME type failed validation
    #[error("invalid MIME type: {0}")]
    InvalidMimeType(String),

    /// Base64 payload failed validation
    #[error("invalid base64 data")]
    InvalidBase64Data,

    /// A buffered stream grew past its frame-size cap without a delimiter
    #[error("frame exceeds maximum size of {max_bytes} bytes")]
    FrameTooLarge { max_bytes: usize },
}
