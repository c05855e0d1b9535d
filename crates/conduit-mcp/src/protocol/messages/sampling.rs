//! Sampling Messages
//!
//! Server-initiated LLM invocation: the server asks the client to run a
//! completion on its behalf with `sampling/createMessage`. The core only
//! carries these shapes; model back-ends live in the host application.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::types::{Content, Role};

/// One message in a sampling conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplingMessage {
    /// Author role
    pub role: Role,
    /// Message content (text, image, or audio)
    pub content: Content,
}

/// Advisory model-selection preferences
///
/// Priorities are normalized 0.0 to 1.0; hints are matched by substring in
/// an implementation-defined way by the client.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelPreferences {
    /// Ordered name hints, strongest preference first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,
    /// Weight given to minimizing cost
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    /// Weight given to minimizing latency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    /// Weight given to maximizing capability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
}

/// A model name hint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelHint {
    /// Suggested model family or name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// `sampling/createMessage` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    /// Conversation so far
    pub messages: Vec<SamplingMessage>,
    /// Model-selection preferences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    /// System prompt the server requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// How much MCP context to include ("none", "thisServer", "allServers")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_context: Option<String>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: u64,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Provider-specific metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// `sampling/createMessage` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResponse {
    /// Role of the generated message (always assistant in practice)
    pub role: Role,
    /// Generated content
    pub content: Content,
    /// Name of the model that produced the completion
    pub model: String,
    /// Why generation stopped ("endTurn", "stopSequence", "maxTokens", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}
