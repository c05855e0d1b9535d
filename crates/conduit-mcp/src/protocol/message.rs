//! JSON-RPC 2.0 Message Codec
//!
//! This module provides the JSON-RPC 2.0 message types shared by every
//! transport and by the protocol engine, with validated decoding and
//! shared serialization behavior through a trait.
//!
//! # Architecture
//!
//! - Core JSON-RPC 2.0 message types with the [`JsonRpcMessageTrait`]
//! - Structural classification of inbound frames (request / notification /
//!   success response / error response)
//! - Strict envelope validation: `jsonrpc` must be exactly `"2.0"`, a
//!   response carries either `result` or `error` but never both
//!
//! # Examples
//!
//! ```rust
//! use conduit_mcp::protocol::{JsonRpcMessage, JsonRpcRequest, JsonRpcMessageTrait, RequestId};
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new(
//!     "ping",
//!     Some(json!({"message": "hello"})),
//!     RequestId::new_number(1),
//! );
//!
//! let json = request.to_json().unwrap();
//! let parsed = JsonRpcMessage::parse(&json).unwrap();
//! assert!(matches!(parsed, JsonRpcMessage::Request(_)));
//! ```

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use crate::protocol::errors::{ProtocolError, ProtocolResult};

/// The only protocol version this codec accepts
pub const JSONRPC_VERSION: &str = "2.0";

/// Largest integer request id that survives a round trip through JSON
///
/// JSON numbers are IEEE-754 doubles on most peers, so integer ids are
/// capped at 2^53 - 1.
pub const MAX_SAFE_INTEGER_ID: i64 = (1 << 53) - 1;

/// JSON-RPC message types supporting requests, responses, and notifications
///
/// This enum unifies all JSON-RPC 2.0 message types into a single type for
/// transport and handling. Each variant preserves the specific structure of
/// its message type while providing unified serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// JSON-RPC request message
    Request(JsonRpcRequest),
    /// JSON-RPC notification message
    Notification(JsonRpcNotification),
    /// JSON-RPC response message (success or error)
    Response(JsonRpcResponse),
}

/// Trait for JSON-RPC message serialization and deserialization
///
/// Provides common functionality for all JSON-RPC message types; any type
/// implementing `Serialize + Deserialize` gets the default implementations
/// for JSON conversion methods.
pub trait JsonRpcMessageTrait: Serialize + for<'de> Deserialize<'de> {
    /// Serialize this message to a JSON string
    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from a JSON string
    fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize directly into a reusable buffer, avoiding the
    /// intermediate `String` allocation
    fn serialize_to_buffer(&self, buffer: &mut BytesMut) -> Result<(), serde_json::Error> {
        serde_json::to_writer(buffer.writer(), self)
    }

    /// Serialize this message to bytes
    fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        let mut buffer = BytesMut::with_capacity(256);
        self.serialize_to_buffer(&mut buffer)?;
        Ok(buffer.freeze())
    }

    /// Deserialize a message from JSON bytes
    fn from_json_bytes(json: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(json)
    }
}

impl JsonRpcMessage {
    /// Create a new notification message
    pub fn from_notification(method: &str, params: Option<Value>) -> Self {
        JsonRpcMessage::Notification(JsonRpcNotification::new(method, params))
    }

    /// Create a new request message
    pub fn from_request(method: &str, params: Option<Value>, id: RequestId) -> Self {
        JsonRpcMessage::Request(JsonRpcRequest::new(method, params, id))
    }

    /// Decode a frame with full envelope validation
    ///
    /// Unlike raw serde deserialization, this rejects frames whose
    /// `jsonrpc` field is not exactly `"2.0"`, responses carrying both
    /// `result` and `error` (or neither), and integer ids outside the
    /// JSON-safe range.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedFrame`] for JSON syntax errors and
    /// [`ProtocolError::InvalidEnvelope`] for structurally invalid
    /// JSON-RPC.
    pub fn parse(json: &str) -> ProtocolResult<Self> {
        Self::parse_bytes(json.as_bytes())
    }

    /// Byte-slice variant of [`JsonRpcMessage::parse`]
    pub fn parse_bytes(json: &[u8]) -> ProtocolResult<Self> {
        let message: JsonRpcMessage = serde_json::from_slice(json)
            .map_err(|source| ProtocolError::MalformedFrame { source })?;
        message.validate()?;
        Ok(message)
    }

    /// Validate the envelope invariants on an already-decoded message
    pub fn validate(&self) -> ProtocolResult<()> {
        match self {
            JsonRpcMessage::Request(request) => {
                check_version(&request.jsonrpc)?;
                request.id.check_json_safe()?;
            }
            JsonRpcMessage::Notification(notification) => {
                check_version(&notification.jsonrpc)?;
            }
            JsonRpcMessage::Response(response) => {
                check_version(&response.jsonrpc)?;
                if let Some(id) = &response.id {
                    id.check_json_safe()?;
                }
                match (&response.result, &response.error) {
                    (Some(_), Some(_)) => {
                        return Err(ProtocolError::InvalidEnvelope {
                            reason: "response carries both result and error".to_string(),
                        })
                    }
                    (None, None) => {
                        return Err(ProtocolError::InvalidEnvelope {
                            reason: "response carries neither result nor error".to_string(),
                        })
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// The method name, for requests and notifications
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(request) => Some(&request.method),
            JsonRpcMessage::Notification(notification) => Some(&notification.method),
            JsonRpcMessage::Response(_) => None,
        }
    }

    /// The request id this message carries, if any
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            JsonRpcMessage::Request(request) => Some(&request.id),
            JsonRpcMessage::Notification(_) => None,
            JsonRpcMessage::Response(response) => response.id.as_ref(),
        }
    }
}

fn check_version(version: &str) -> ProtocolResult<()> {
    if version == JSONRPC_VERSION {
        Ok(())
    } else {
        Err(ProtocolError::InvalidEnvelope {
            reason: format!("jsonrpc must be \"2.0\", got {version:?}"),
        })
    }
}

/// Request ID supporting both string and numeric formats per JSON-RPC 2.0
///
/// Serialization preserves the original wire format: an integer id on a
/// request produces an integer id on its response.
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::protocol::RequestId;
///
/// let string_id = RequestId::String("req-123".to_string());
/// let numeric_id = RequestId::Number(42);
///
/// assert_eq!(serde_json::to_string(&string_id).unwrap(), r#""req-123""#);
/// assert_eq!(serde_json::to_string(&numeric_id).unwrap(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String-based request identifier
    String(String),
    /// Numeric request identifier
    Number(i64),
}

impl RequestId {
    /// Create a new string-based request ID
    pub fn new_string(id: impl Into<String>) -> Self {
        RequestId::String(id.into())
    }

    /// Create a new numeric request ID
    pub fn new_number(id: i64) -> Self {
        RequestId::Number(id)
    }

    /// Reject integer ids that would lose precision as JSON numbers
    pub fn check_json_safe(&self) -> ProtocolResult<()> {
        match self {
            RequestId::Number(n) if n.unsigned_abs() > MAX_SAFE_INTEGER_ID as u64 => {
                Err(ProtocolError::InvalidEnvelope {
                    reason: format!("integer id {n} exceeds 2^53 - 1"),
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
        }
    }
}

/// JSON-RPC 2.0 Request Message
///
/// Represents a request to invoke a method on the remote peer. All fields
/// are required except for `params`, which may be omitted if the method
/// takes no parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// Protocol version - always "2.0"
    pub jsonrpc: String,

    /// Name of the method to invoke
    pub method: String,

    /// Parameters for the method
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Unique identifier for this request
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

impl JsonRpcMessageTrait for JsonRpcRequest {}

/// JSON-RPC 2.0 error object
///
/// Carried by error responses; `code` uses the canonical ranges from
/// [`crate::protocol::constants::error_codes`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    /// Numeric error code
    pub code: i32,
    /// Short human-readable description
    pub message: String,
    /// Optional structured detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new error object
    pub fn new(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// JSON-RPC 2.0 Response Message
///
/// Contains either a successful result or error information, never both.
/// The `id` matches the originating request; parse-error responses carry a
/// null id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    /// Protocol version - always "2.0"
    pub jsonrpc: String,

    /// Result of a successful invocation (mutually exclusive with error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error information for a failed invocation (mutually exclusive with result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Request identifier from the original request (null for parse errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    /// Create a successful JSON-RPC 2.0 response
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: Some(id),
        }
    }

    /// Create an error JSON-RPC 2.0 response
    pub fn error(error: JsonRpcError, id: Option<RequestId>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Whether this response reports success
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

impl JsonRpcMessageTrait for JsonRpcResponse {}

/// JSON-RPC 2.0 Notification Message
///
/// A request that does not expect a response. The absence of an `id` field
/// is what distinguishes notifications from requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    /// Protocol version - always "2.0"
    pub jsonrpc: String,

    /// Name of the notification method
    pub method: String,

    /// Parameters for the notification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC 2.0 notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

impl JsonRpcMessageTrait for JsonRpcNotification {}

impl JsonRpcMessageTrait for JsonRpcMessage {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn classifies_request() {
        let frame = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        let message = JsonRpcMessage::parse(frame).unwrap();
        match message {
            JsonRpcMessage::Request(request) => {
                assert_eq!(request.method, "tools/list");
                assert_eq!(request.id, RequestId::Number(1));
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn classifies_notification() {
        let frame = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let message = JsonRpcMessage::parse(frame).unwrap();
        assert!(matches!(message, JsonRpcMessage::Notification(_)));
    }

    #[test]
    fn classifies_success_and_error_responses() {
        let success = r#"{"jsonrpc":"2.0","id":"a","result":{}}"#;
        let error = r#"{"jsonrpc":"2.0","id":"a","error":{"code":-32601,"message":"no"}}"#;

        match JsonRpcMessage::parse(success).unwrap() {
            JsonRpcMessage::Response(response) => assert!(response.is_success()),
            other => panic!("expected response, got {other:?}"),
        }
        match JsonRpcMessage::parse(error).unwrap() {
            JsonRpcMessage::Response(response) => {
                assert_eq!(response.error.unwrap().code, -32601);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_version() {
        let frame = r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#;
        assert!(JsonRpcMessage::parse(frame).is_err());
    }

    #[test]
    fn rejects_result_and_error_together() {
        let frame = r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":0,"message":"x"}}"#;
        assert!(JsonRpcMessage::parse(frame).is_err());
    }

    #[test]
    fn rejects_unsafe_integer_id() {
        let too_big = (1i64 << 53) + 1;
        let frame = format!(r#"{{"jsonrpc":"2.0","id":{too_big},"method":"ping"}}"#);
        assert!(JsonRpcMessage::parse(&frame).is_err());

        let boundary = (1i64 << 53) - 1;
        let frame = format!(r#"{{"jsonrpc":"2.0","id":{boundary},"method":"ping"}}"#);
        assert!(JsonRpcMessage::parse(&frame).is_ok());
    }

    #[test]
    fn id_type_preserved_on_response() {
        let request = JsonRpcRequest::new("ping", None, RequestId::new_number(7));
        let response = JsonRpcResponse::success(json!({}), request.id.clone());
        let wire = response.to_json().unwrap();
        assert!(wire.contains(r#""id":7"#));

        let request = JsonRpcRequest::new("ping", None, RequestId::new_string("7"));
        let response = JsonRpcResponse::success(json!({}), request.id);
        let wire = response.to_json().unwrap();
        assert!(wire.contains(r#""id":"7""#));
    }

    #[test]
    fn empty_params_equivalent_to_omitted() {
        let with_none = JsonRpcRequest::new("ping", None, RequestId::new_number(1));
        let wire = with_none.to_json().unwrap();
        assert!(!wire.contains("params"));
    }

    proptest! {
        // Round-trip: encode(decode(frame)) == frame modulo key order.
        #[test]
        fn request_round_trip(id in 0i64..MAX_SAFE_INTEGER_ID, method in "[a-z/]{1,24}") {
            let request = JsonRpcRequest::new(
                method,
                Some(json!({"a": id})),
                RequestId::new_number(id),
            );
            let wire = request.to_json().unwrap();
            let decoded = JsonRpcMessage::parse(&wire).unwrap();
            let rewire = decoded.to_json().unwrap();
            let a: Value = serde_json::from_str(&wire).unwrap();
            let b: Value = serde_json::from_str(&rewire).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
