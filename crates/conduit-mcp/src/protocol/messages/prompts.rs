//! Prompt Catalog Messages
//!
//! Shapes for `prompts/list` and `prompts/get`. A prompt resolves to an
//! ordered list of chat messages built from the shared content model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::protocol::types::{Content, Cursor, Role};

/// A prompt template available from the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prompt {
    /// Unique prompt name
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Arguments this prompt accepts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

impl Prompt {
    /// Create a prompt with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: None,
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach the argument list
    pub fn with_arguments(mut self, arguments: Vec<PromptArgument>) -> Self {
        self.arguments = Some(arguments);
        self
    }
}

/// One argument accepted by a prompt template
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

impl PromptArgument {
    /// Create a required argument
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: Some(true),
        }
    }

    /// Create an optional argument
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            required: None,
        }
    }
}

/// One message produced by resolving a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMessage {
    /// Role of the message author
    pub role: Role,
    /// Message content
    pub content: Content,
}

impl PromptMessage {
    /// Create a user message
    pub fn user(content: Content) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    /// Create an assistant message
    pub fn assistant(content: Content) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }
}

/// `prompts/list` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ListPromptsRequest {
    /// Opaque cursor from a previous page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// `prompts/list` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListPromptsResponse {
    /// Prompts on this page
    pub prompts: Vec<Prompt>,
    /// Cursor for the next page; absent on the final page
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// `prompts/get` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetPromptRequest {
    /// Name of the prompt to resolve
    pub name: String,
    /// Argument values, all strings on the wire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
}

/// `prompts/get` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetPromptResponse {
    /// Human-readable description of the resolved prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Resolved messages, in conversation order
    pub messages: Vec<PromptMessage>,
}
