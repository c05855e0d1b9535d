//! Logging Feature Messages
//!
//! The client sets a minimum severity with `logging/setLevel`; the server
//! emits `notifications/message` records at or above it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::types::LogLevel;

/// `logging/setLevel` request parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetLevelRequest {
    /// Minimum severity the client wants to receive
    pub level: LogLevel,
}

/// `notifications/message` parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingMessageNotification {
    /// Severity of this record
    pub level: LogLevel,
    /// Optional logger name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Arbitrary JSON payload
    pub data: Value,
}

impl LoggingMessageNotification {
    /// Create a record with no logger name
    pub fn new(level: LogLevel, data: Value) -> Self {
        Self {
            level,
            logger: None,
            data,
        }
    }
}
