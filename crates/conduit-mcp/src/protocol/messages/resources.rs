//! Resource Catalog Messages
//!
//! Shapes for the `resources/*` surface: concrete resources, URI
//! templates, reads, and subscriptions.

use serde::{Deserialize, Serialize};

use crate::protocol::types::{Annotations, Cursor, MimeType, ResourceContents, Uri};

/// An addressable piece of content the server exposes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    /// Unique URI of the resource
    pub uri: Uri,
    /// Human-readable name
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type, if known
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<MimeType>,
    /// Size in bytes, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Audience/priority hints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

impl Resource {
    /// Create a resource from a URI and display name
    pub fn new(uri: Uri, name: impl Into<String>) -> Self {
        Self {
            uri,
            name: name.into(),
            description: None,
            mime_type: None,
            size: None,
            annotations: None,
        }
    }

    /// Attach a MIME type
    pub fn with_mime_type(mut self, mime_type: MimeType) -> Self {
        self.mime_type = Some(mime_type);
        self
    }
}

/// A parameterized resource exposed as a URI template
///
/// The template string uses `{variable}` placeholders where each variable
/// matches one path segment; see [`crate::registry::UriTemplate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceTemplate {
    /// The URI template string, e.g. `users://{userId}/profile`
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    /// Human-readable name
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type shared by all matching resources, if uniform
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<MimeType>,
    /// Audience/priority hints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

impl ResourceTemplate {
    /// Create a template from its template string and display name
    pub fn new(uri_template: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri_template: uri_template.into(),
            name: name.into(),
            description: None,
            mime_type: None,
            annotations: None,
        }
    }
}

/// `resources/list` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ListResourcesRequest {
    /// Opaque cursor from a previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// `resources/list` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListResourcesResponse {
    /// Resources on this page
    pub resources: Vec<Resource>,
    /// Cursor for the next page; absent on the final page
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// `resources/templates/list` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ListResourceTemplatesRequest {
    /// Opaque cursor from a previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// `resources/templates/list` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListResourceTemplatesResponse {
    /// Templates on this page
    #[serde(rename = "resourceTemplates")]
    pub resource_templates: Vec<ResourceTemplate>,
    /// Cursor for the next page; absent on the final page
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// `resources/read` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadResourceRequest {
    /// URI of the resource to read; concrete or template-matched
    pub uri: Uri,
}

/// `resources/read` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadResourceResponse {
    /// The resource payloads
    pub contents: Vec<ResourceContents>,
}

/// `resources/subscribe` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscribeRequest {
    /// URI to watch for updates
    pub uri: Uri,
}

/// `resources/unsubscribe` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnsubscribeRequest {
    /// URI to stop watching
    pub uri: Uri,
}
