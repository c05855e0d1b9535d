//! Argument Autocompletion Messages
//!
//! `completion/complete` lets a client ask the server for completions of a
//! prompt argument or resource template variable while the user types.

use serde::{Deserialize, Serialize};

/// What the completion request refers to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// Completing an argument of a prompt
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// Prompt name
        name: String,
    },
    /// Completing a variable of a resource template
    #[serde(rename = "ref/resource")]
    Resource {
        /// Template URI string
        uri: String,
    },
}

/// The argument being completed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionArgument {
    /// Argument or template-variable name
    pub name: String,
    /// The partial value typed so far
    pub value: String,
}

/// `completion/complete` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteRequest {
    /// Prompt or resource-template reference
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// Argument under completion
    pub argument: CompletionArgument,
}

/// Completion values returned by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Completion {
    /// Candidate values, at most 100
    pub values: Vec<String>,
    /// Total number of candidates, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Whether more candidates exist beyond `values`
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// `completion/complete` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompleteResponse {
    /// The completion payload
    pub completion: Completion,
}

impl CompleteResponse {
    /// An empty completion
    pub fn empty() -> Self {
        Self {
            completion: Completion {
                values: Vec::new(),
                total: None,
                has_more: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reference_tagging() {
        let reference = CompletionReference::Prompt {
            name: "greet".to_string(),
        };
        let wire = serde_json::to_value(&reference).unwrap();
        assert_eq!(wire, json!({"type": "ref/prompt", "name": "greet"}));
    }
}
