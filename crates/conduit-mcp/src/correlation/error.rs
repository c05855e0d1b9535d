//! Correlation Error Types

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::protocol::{JsonRpcError, RequestId};

/// Result alias for correlation operations
pub type CorrelationResult<T> = Result<T, CorrelationError>;

/// Errors surfaced by the pending-request table
///
/// These are also the failure values delivered to request waiters: a
/// caller of `request()` observes exactly one of a success value or one of
/// these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrelationError {
    /// No pending request with this id
    #[error("no pending request with id {id}")]
    RequestNotFound { id: RequestId },

    /// The waiting side dropped its receiver before the response arrived
    #[error("response channel closed for request {id}")]
    ChannelClosed { id: RequestId },

    /// Per-request timer elapsed without a response
    #[error("request {id} timed out after {elapsed_ms}ms")]
    Timeout { id: RequestId, elapsed_ms: u64 },

    /// Hard total-timeout cap elapsed, regardless of progress
    #[error("request {id} exceeded its total timeout of {limit_ms}ms")]
    TotalTimeout { id: RequestId, limit_ms: u64 },

    /// Request was cancelled before completion
    #[error("request {id} cancelled{}", reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Cancelled {
        id: RequestId,
        reason: Option<String>,
    },

    /// Transport closed while the request was pending
    #[error("connection closed with request {id} pending")]
    ConnectionClosed { id: RequestId },

    /// The peer answered with a JSON-RPC error response
    #[error("remote error: {error}")]
    Remote { error: JsonRpcError },

    /// The pending table is at capacity
    #[error("maximum pending requests exceeded ({limit})")]
    CapacityExceeded { limit: usize },
}
