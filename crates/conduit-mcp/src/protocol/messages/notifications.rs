//! Cross-Cutting Notification Parameters
//!
//! Parameter shapes for cancellation, progress, and resource-update
//! notifications. List-changed notifications carry no parameters.

use serde::{Deserialize, Serialize};

use crate::protocol::message::RequestId;
use crate::protocol::types::{ProgressToken, Uri};

/// `notifications/cancelled` parameters
///
/// Aborts the in-flight request with the matching id. By contract the
/// `initialize` request is never cancelled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancelledNotification {
    /// Id of the request being cancelled
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    /// Optional human-readable reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `notifications/progress` parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressNotification {
    /// Token from the originating request's `_meta.progressToken`
    #[serde(rename = "progressToken")]
    pub progress_token: ProgressToken,
    /// Work completed so far; must increase between notifications
    pub progress: f64,
    /// Total amount of work, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Human-readable status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `notifications/resources/updated` parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceUpdatedNotification {
    /// URI of the resource that changed
    pub uri: Uri,
}
