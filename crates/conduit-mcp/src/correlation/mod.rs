//! Request/Response Correlation
//!
//! Tracks outstanding outgoing requests by id, delivers their responses to
//! waiting callers, and enforces per-request timeout policy including
//! progress-based timer resets and the hard total-timeout cap.
//!
//! The table is passive: the protocol engine drives expiry by calling
//! [`CorrelationManager::take_expired`] from its sweep task, so it can
//! emit the matching `notifications/cancelled` frames itself.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{CorrelationError, CorrelationResult};
pub use manager::{CorrelationConfig, CorrelationManager};
pub use types::{ExpiredRequest, PendingRequest, RequestIdGenerator, RequestOptions, TimeoutKind};
