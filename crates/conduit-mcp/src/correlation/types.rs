//! Correlation Data Types
//!
//! The pending-request record, per-request options, and the monotonic id
//! generator shared by every outgoing request on a connection.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use serde_json::Value;
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use crate::correlation::error::CorrelationResult;
use crate::protocol::constants::defaults;
use crate::protocol::RequestId;

/// Per-request timeout and progress options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Per-request timeout; restarts on progress when
    /// `reset_timeout_on_progress` is set
    pub timeout: Duration,

    /// Hard cap on total elapsed time; exceeding it is always fatal
    /// regardless of progress
    pub max_total_timeout: Option<Duration>,

    /// Restart the per-request timer whenever a progress notification for
    /// this request arrives
    pub reset_timeout_on_progress: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(defaults::REQUEST_TIMEOUT_MS),
            max_total_timeout: None,
            reset_timeout_on_progress: false,
        }
    }
}

impl RequestOptions {
    /// Options with a specific per-request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// Which timer expired for an overdue request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The per-request (resettable) timer
    PerRequest,
    /// The hard total-elapsed cap
    Total,
}

/// An entry removed from the table by the expiry sweep
#[derive(Debug)]
pub struct ExpiredRequest {
    /// Id of the expired request
    pub id: RequestId,
    /// Method of the expired request
    pub method: String,
    /// Which timer fired
    pub kind: TimeoutKind,
    /// Elapsed wall time since registration
    pub elapsed: Duration,
}

/// Internal record for one outstanding outgoing request
#[derive(Debug)]
pub struct PendingRequest {
    /// Completes the waiting caller exactly once
    pub(crate) sender: oneshot::Sender<CorrelationResult<Value>>,

    /// Method name, kept for cancellation bookkeeping
    pub(crate) method: String,

    /// When the request was registered
    pub(crate) registered_at: Instant,

    /// Start of the current per-request timeout window
    pub(crate) window_start: Instant,

    /// Timeout policy
    pub(crate) options: RequestOptions,
}

impl PendingRequest {
    /// Create a record starting its timeout window now
    pub fn new(
        sender: oneshot::Sender<CorrelationResult<Value>>,
        method: impl Into<String>,
        options: RequestOptions,
    ) -> Self {
        let now = Instant::now();
        Self {
            sender,
            method: method.into(),
            registered_at: now,
            window_start: now,
            options,
        }
    }

    /// Which timer, if any, has expired as of `now`
    pub fn expired_kind(&self, now: Instant) -> Option<TimeoutKind> {
        if let Some(cap) = self.options.max_total_timeout {
            if now.duration_since(self.registered_at) >= cap {
                return Some(TimeoutKind::Total);
            }
        }
        if now.duration_since(self.window_start) >= self.options.timeout {
            return Some(TimeoutKind::PerRequest);
        }
        None
    }

    /// Restart the per-request window (progress received)
    pub fn reset_window(&mut self) {
        self.window_start = Instant::now();
    }
}

/// Monotonically increasing integer request-id generator
///
/// Ids are unique per connection for its lifetime; the protocol engine
/// never reuses an id for concurrent outstanding requests.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: AtomicI64,
}

impl RequestIdGenerator {
    /// Create a generator starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_is_monotonic() {
        let generator = RequestIdGenerator::new();
        assert_eq!(generator.next_id(), RequestId::Number(0));
        assert_eq!(generator.next_id(), RequestId::Number(1));
        assert_eq!(generator.next_id(), RequestId::Number(2));
    }

    #[test]
    fn total_timeout_wins_over_window_reset() {
        let (sender, _receiver) = oneshot::channel();
        let mut pending = PendingRequest::new(
            sender,
            "tools/call",
            RequestOptions {
                timeout: Duration::from_millis(50),
                max_total_timeout: Some(Duration::from_millis(10)),
                reset_timeout_on_progress: true,
            },
        );
        pending.reset_window();
        let later = Instant::now() + Duration::from_millis(20);
        assert_eq!(pending.expired_kind(later), Some(TimeoutKind::Total));
    }
}
