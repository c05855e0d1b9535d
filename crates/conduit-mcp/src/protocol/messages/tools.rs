//! Tool Catalog Messages
//!
//! Shapes for `tools/list` and `tools/call`. Input and output schemas are
//! JSON-schema-shaped values the core carries opaquely; only the envelope
//! is validated here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::types::{Content, Cursor};

/// A tool the server can perform on behalf of the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// Unique tool name
    pub name: String,

    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema describing the accepted arguments
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,

    /// JSON schema describing `structuredContent` on successful results
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,

    /// Behavioral hints for the host application
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl Tool {
    /// Create a tool with just a name and input schema
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
            output_schema: None,
            annotations: None,
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach an output schema
    pub fn with_output_schema(mut self, output_schema: Value) -> Self {
        self.output_schema = Some(output_schema);
        self
    }
}

/// Behavioral hints attached to a tool definition
///
/// Hints are advisory; hosts must not rely on them for safety decisions.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// Display title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The tool does not mutate its environment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// The tool may perform destructive updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// Repeat calls with the same arguments have no additional effect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// The tool interacts with entities outside the session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

/// `tools/list` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ListToolsRequest {
    /// Opaque cursor from a previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListToolsResponse {
    /// Tools on this page
    pub tools: Vec<Tool>,
    /// Cursor for the next page; absent on the final page
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// `tools/call` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolRequest {
    /// Name of the tool to invoke
    pub name: String,
    /// Tool arguments, validated by the tool's own schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// `tools/call` result
///
/// Failures *inside* the tool surface as `is_error = true` on a successful
/// JSON-RPC result; failures finding or dispatching the tool surface as
/// JSON-RPC errors instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallToolResponse {
    /// Unstructured result content
    pub content: Vec<Content>,

    /// Whether the tool itself reported failure
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,

    /// Structured result; required when the tool declares an
    /// `outputSchema` and the call succeeded
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl CallToolResponse {
    /// Successful result with text content only
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: None,
            structured_content: None,
        }
    }

    /// Tool-level failure carrying a diagnostic message
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: Some(true),
            structured_content: None,
        }
    }

    /// Attach structured content
    pub fn with_structured(mut self, structured: Value) -> Self {
        self.structured_content = Some(structured);
        self
    }

    /// Whether the tool reported failure
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_result_wire_shape() {
        let result = CallToolResponse::text("5").with_structured(json!({"sum": 5}));
        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(
            wire,
            json!({
                "content": [{"type": "text", "text": "5"}],
                "structuredContent": {"sum": 5}
            })
        );
    }

    #[test]
    fn tool_schema_field_names() {
        let tool = Tool::new("add", json!({"type": "object"}))
            .with_output_schema(json!({"type": "object"}));
        let wire = serde_json::to_value(&tool).unwrap();
        assert!(wire.get("inputSchema").is_some());
        assert!(wire.get("outputSchema").is_some());
        assert!(wire.get("description").is_none());
    }
}
