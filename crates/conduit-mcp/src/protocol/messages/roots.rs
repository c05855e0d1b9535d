//! Roots Messages
//!
//! Roots are a client-owned list of filesystem URIs bounding where the
//! server may operate. The server enumerates them with `roots/list`.

use serde::{Deserialize, Serialize};

use crate::protocol::types::Uri;

/// A client-declared filesystem root
///
/// Root URIs must start with `file://`; the registry enforces this at
/// registration time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Root {
    /// The root URI
    pub uri: Uri,
    /// Optional display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Root {
    /// Create a root with a display name
    pub fn new(uri: Uri, name: impl Into<String>) -> Self {
        Self {
            uri,
            name: Some(name.into()),
        }
    }
}

/// `roots/list` result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListRootsResponse {
    /// All declared roots, in insertion order
    pub roots: Vec<Root>,
}
