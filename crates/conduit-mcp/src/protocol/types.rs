//! Core MCP Protocol Types and Domain-Specific Newtypes
//!
//! Domain newtypes with validation and proper encapsulation, the
//! capability shapes exchanged at initialization, and the shared content
//! model used by tool results, prompt messages, resource reads, and
//! sampling.
//!
//! # Architecture
//!
//! Validated newtypes use private internal fields with controlled access
//! through constructors and accessor methods, preventing invalid protocol
//! messages at construction time. Capability and content shapes are plain
//! serde structs matching the wire format field-for-field.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use crate::protocol::constants::versions;
use crate::protocol::errors::{ProtocolError, ProtocolResult};
use crate::protocol::message::RequestId;

/// Protocol version with validation and proper encapsulation
///
/// An MCP protocol revision in the format YYYY-MM-DD. The internal string
/// is private to guarantee validation.
///
/// # Examples
///
/// ```rust
/// use conduit_mcp::protocol::ProtocolVersion;
///
/// let version = ProtocolVersion::latest();
/// assert_eq!(version.as_str(), "2025-03-26");
///
/// assert!(ProtocolVersion::new("not-a-date").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ProtocolVersion(String);

impl ProtocolVersion {
    /// Create a new protocol version with format validation
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidProtocolVersion` if the version is
    /// not shaped YYYY-MM-DD.
    pub fn new(version: impl Into<String>) -> ProtocolResult<Self> {
        let version = version.into();
        if Self::is_valid_version(&version) {
            Ok(Self(version))
        } else {
            Err(ProtocolError::InvalidProtocolVersion(version))
        }
    }

    /// The latest revision this implementation speaks
    pub fn latest() -> Self {
        Self(versions::LATEST.to_string())
    }

    /// Get the version string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this revision is one the implementation accepts
    pub fn is_supported(&self) -> bool {
        versions::SUPPORTED.contains(&self.0.as_str())
    }

    fn is_valid_version(version: &str) -> bool {
        if version.len() != 10 {
            return false;
        }
        let chars: Vec<char> = version.chars().collect();
        chars.get(4) == Some(&'-')
            && chars.get(7) == Some(&'-')
            && chars[0..4].iter().all(|c| c.is_ascii_digit())
            && chars[5..7].iter().all(|c| c.is_ascii_digit())
            && chars[8..10].iter().all(|c| c.is_ascii_digit())
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::latest()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// URI with validation and type safety
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Uri(String);

impl Uri {
    /// Create a new URI with validation
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidUri` if the URI has no scheme.
    pub fn new(uri: impl Into<String>) -> ProtocolResult<Self> {
        let uri = uri.into();
        if Self::is_valid_uri(&uri) {
            Ok(Self(uri))
        } else {
            Err(ProtocolError::InvalidUri(uri))
        }
    }

    /// Create a URI without validation (for trusted sources such as
    /// constants or internally generated URIs)
    pub fn new_unchecked(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Get the URI string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the URI scheme (e.g. "file", "https", "users")
    pub fn scheme(&self) -> Option<&str> {
        self.0.split(':').next()
    }

    /// Whether this is a file URI
    pub fn is_file_uri(&self) -> bool {
        self.0.starts_with("file://")
    }

    fn is_valid_uri(uri: &str) -> bool {
        !uri.is_empty() && uri.contains(':') && !uri.starts_with(':')
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// MIME type with validation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MimeType(String);

impl MimeType {
    /// Create a new MIME type with validation
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidMimeType` unless shaped
    /// `type/subtype`.
    pub fn new(mime_type: impl Into<String>) -> ProtocolResult<Self> {
        let mime_type = mime_type.into();
        if Self::is_valid_mime_type(&mime_type) {
            Ok(Self(mime_type))
        } else {
            Err(ProtocolError::InvalidMimeType(mime_type))
        }
    }

    /// Get the MIME type string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The main type (e.g. "text" from "text/plain")
    pub fn main_type(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    fn is_valid_mime_type(mime_type: &str) -> bool {
        let parts: Vec<&str> = mime_type.split('/').collect();
        parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty()
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base64 encoded payload with validation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Base64Data(String);

impl Base64Data {
    /// Create new base64 data with validation
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidBase64Data` if the payload carries
    /// characters outside the base64 alphabet or interior padding.
    pub fn new(data: impl Into<String>) -> ProtocolResult<Self> {
        let data = data.into();
        if Self::is_valid_base64(&data) {
            Ok(Self(data))
        } else {
            Err(ProtocolError::InvalidBase64Data)
        }
    }

    /// Get the base64 string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid_base64(data: &str) -> bool {
        !data.is_empty()
            && data
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
            && !data.trim_end_matches('=').contains('=')
    }
}

/// Peer identification exchanged during initialization
///
/// Both sides send a `{ name, version }` pair in the handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Implementation {
    /// Name of the implementation
    pub name: String,
    /// Version of the implementation
    pub version: String,
}

impl Implementation {
    /// Create a new implementation descriptor
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Progress token correlating progress notifications with a request
///
/// Chosen by the request sender and carried in `params._meta.progressToken`.
/// Tokens are opaque and per-sender; both string and integer forms appear
/// on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// String token
    String(String),
    /// Integer token
    Number(i64),
}

impl From<&RequestId> for ProgressToken {
    fn from(id: &RequestId) -> Self {
        match id {
            RequestId::String(s) => ProgressToken::String(s.clone()),
            RequestId::Number(n) => ProgressToken::Number(*n),
        }
    }
}

impl fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressToken::String(s) => write!(f, "{s}"),
            ProgressToken::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Opaque pagination cursor
///
/// Chosen by the listing side; clients pass it back verbatim to fetch the
/// next page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    /// Wrap a cursor token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Client capabilities advertised during initialization
///
/// Absence of a sub-object means "not supported".
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ClientCapabilities {
    /// Experimental, implementation-defined capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    /// The client can answer `sampling/createMessage`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    /// The client exposes a roots list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
}

impl ClientCapabilities {
    /// Capabilities for a client that supports roots (with change
    /// notifications) and sampling
    pub fn full() -> Self {
        Self {
            experimental: None,
            sampling: Some(SamplingCapability::default()),
            roots: Some(RootsCapability {
                list_changed: Some(true),
            }),
        }
    }
}

/// Server capabilities advertised during initialization
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServerCapabilities {
    /// Experimental, implementation-defined capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
    /// The server emits `notifications/message`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
    /// The server can answer `completion/complete`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapability>,
    /// Prompt catalog support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    /// Resource catalog support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    /// Tool catalog support
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

/// Marker capability for sampling support
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SamplingCapability {}

/// Roots capability with optional change notifications
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RootsCapability {
    /// Whether `notifications/roots/list_changed` will be emitted
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Marker capability for logging support
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LoggingCapability {}

/// Marker capability for completion support
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CompletionsCapability {}

/// Prompt capability with optional change notifications
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PromptsCapability {
    /// Whether `notifications/prompts/list_changed` will be emitted
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource capability with optional subscription and change notifications
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ResourcesCapability {
    /// Whether `resources/subscribe` is accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// Whether `notifications/resources/list_changed` will be emitted
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Tool capability with optional change notifications
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ToolsCapability {
    /// Whether `notifications/tools/list_changed` will be emitted
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

// ---------------------------------------------------------------------------
// Content model
// ---------------------------------------------------------------------------

/// Audience and priority hints attached to content items
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Annotations {
    /// Which roles the content targets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Role>>,
    /// Relative importance, 0.0 (least) to 1.0 (most)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

/// Conversation role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Multi-modal content carried in tool results, prompt messages, and
/// sampling exchanges
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Content {
    /// Plain text content
    #[serde(rename = "text")]
    Text {
        /// The text content
        text: String,
        /// Optional audience/priority hints
        #[serde(skip_serializing_if = "Option::is_none")]
        annotations: Option<Annotations>,
    },

    /// Image content with base64 encoded data
    #[serde(rename = "image")]
    Image {
        /// Base64 encoded image data
        data: Base64Data,
        /// MIME type of the image
        #[serde(rename = "mimeType")]
        mime_type: MimeType,
        /// Optional audience/priority hints
        #[serde(skip_serializing_if = "Option::is_none")]
        annotations: Option<Annotations>,
    },

    /// Audio content with base64 encoded data
    #[serde(rename = "audio")]
    Audio {
        /// Base64 encoded audio data
        data: Base64Data,
        /// MIME type of the audio
        #[serde(rename = "mimeType")]
        mime_type: MimeType,
        /// Optional audience/priority hints
        #[serde(skip_serializing_if = "Option::is_none")]
        annotations: Option<Annotations>,
    },

    /// A resource embedded into the content stream
    #[serde(rename = "resource")]
    Resource {
        /// The embedded resource contents
        resource: ResourceContents,
        /// Optional audience/priority hints
        #[serde(skip_serializing_if = "Option::is_none")]
        annotations: Option<Annotations>,
    },
}

impl Content {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            annotations: None,
        }
    }

    /// Create image content
    pub fn image(data: Base64Data, mime_type: MimeType) -> Self {
        Self::Image {
            data,
            mime_type,
            annotations: None,
        }
    }

    /// Create audio content
    pub fn audio(data: Base64Data, mime_type: MimeType) -> Self {
        Self::Audio {
            data,
            mime_type,
            annotations: None,
        }
    }

    /// Create embedded-resource content
    pub fn resource(resource: ResourceContents) -> Self {
        Self::Resource {
            resource,
            annotations: None,
        }
    }

    /// Extract text content if available
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text, .. } => Some(text),
            Content::Resource {
                resource: ResourceContents::Text { text, .. },
                ..
            } => Some(text),
            _ => None,
        }
    }
}

/// The payload of one resource, textual or binary
///
/// Used both in `resources/read` results and embedded in [`Content`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ResourceContents {
    /// Textual resource payload
    Text {
        /// URI of the resource
        uri: Uri,
        /// MIME type, if known
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<MimeType>,
        /// Text payload
        text: String,
    },
    /// Binary resource payload
    Blob {
        /// URI of the resource
        uri: Uri,
        /// MIME type, if known
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<MimeType>,
        /// Base64 encoded payload
        blob: Base64Data,
    },
}

impl ResourceContents {
    /// Create textual contents
    pub fn text(uri: Uri, text: impl Into<String>) -> Self {
        Self::Text {
            uri,
            mime_type: None,
            text: text.into(),
        }
    }

    /// Create textual contents with a MIME type
    pub fn text_with_mime(uri: Uri, mime_type: MimeType, text: impl Into<String>) -> Self {
        Self::Text {
            uri,
            mime_type: Some(mime_type),
            text: text.into(),
        }
    }

    /// Create binary contents
    pub fn blob(uri: Uri, mime_type: MimeType, blob: Base64Data) -> Self {
        Self::Blob {
            uri,
            mime_type: Some(mime_type),
            blob,
        }
    }

    /// URI of the underlying resource
    pub fn uri(&self) -> &Uri {
        match self {
            ResourceContents::Text { uri, .. } => uri,
            ResourceContents::Blob { uri, .. } => uri,
        }
    }
}

/// Severity levels for the logging feature, lowest to highest
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn protocol_version_validation() {
        assert!(ProtocolVersion::new("2025-03-26").is_ok());
        assert!(ProtocolVersion::new("2025-3-26").is_err());
        assert!(ProtocolVersion::new("latest").is_err());
        assert!(ProtocolVersion::latest().is_supported());
        assert!(!ProtocolVersion::new("1999-01-01").unwrap().is_supported());
    }

    #[test]
    fn uri_validation() {
        assert!(Uri::new("file:///data.txt").unwrap().is_file_uri());
        assert!(!Uri::new("users://42/profile").unwrap().is_file_uri());
        assert!(Uri::new("no-scheme").is_err());
    }

    #[test]
    fn capability_wire_shape() {
        let caps = ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(true),
            }),
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: None,
            }),
            ..Default::default()
        };
        let wire = serde_json::to_value(&caps).unwrap();
        assert_eq!(
            wire,
            json!({
                "tools": {"listChanged": true},
                "resources": {"subscribe": true}
            })
        );
    }

    #[test]
    fn content_tagging() {
        let content = Content::text("5");
        let wire = serde_json::to_value(&content).unwrap();
        assert_eq!(wire, json!({"type": "text", "text": "5"}));

        let decoded: Content = serde_json::from_value(json!({
            "type": "resource",
            "resource": {"uri": "users://42/profile", "text": "{}"}
        }))
        .unwrap();
        assert!(matches!(decoded, Content::Resource { .. }));
    }

    #[test]
    fn log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Warning);
        assert!(LogLevel::Error < LogLevel::Emergency);
        assert_eq!(serde_json::to_value(LogLevel::Warning).unwrap(), json!("warning"));
    }

    #[test]
    fn progress_token_from_request_id() {
        let token = ProgressToken::from(&RequestId::new_number(9));
        assert_eq!(token, ProgressToken::Number(9));
    }
}
