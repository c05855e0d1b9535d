//! Correlation Manager
//!
//! Thread-safe pending-request table with timeout bookkeeping. Supports
//! both numeric and string request ids, though the engine only allocates
//! numeric ones.

// Layer 1: Standard library imports
use std::time::Instant;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

// Layer 3: Internal module imports
use crate::correlation::error::{CorrelationError, CorrelationResult};
use crate::correlation::types::{ExpiredRequest, PendingRequest, RequestOptions, TimeoutKind};
use crate::protocol::RequestId;

/// Configuration for the correlation manager
#[derive(Debug, Clone)]
pub struct CorrelationConfig {
    /// Maximum number of pending requests (0 = unlimited)
    pub max_pending_requests: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            max_pending_requests: 1000,
        }
    }
}

/// Pending-request table for JSON-RPC request/response correlation
///
/// Each registered request is completed exactly once: by its response, by
/// a timeout, by cancellation, or by connection teardown. Entry removal
/// always precedes delivery, so a late response for a completed id is
/// reported as unknown.
#[derive(Debug, Default)]
pub struct CorrelationManager {
    /// Pending requests by id
    requests: DashMap<RequestId, PendingRequest>,

    /// Configuration settings
    config: CorrelationConfig,
}

impl CorrelationManager {
    /// Create a new correlation manager
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            requests: DashMap::new(),
            config,
        }
    }

    /// Register a request, returning the channel its outcome arrives on
    ///
    /// # Errors
    ///
    /// Returns `CorrelationError::CapacityExceeded` when the table is at
    /// its configured limit.
    pub fn register(
        &self,
        id: RequestId,
        method: &str,
        options: RequestOptions,
    ) -> CorrelationResult<oneshot::Receiver<CorrelationResult<Value>>> {
        if self.config.max_pending_requests > 0
            && self.requests.len() >= self.config.max_pending_requests
        {
            return Err(CorrelationError::CapacityExceeded {
                limit: self.config.max_pending_requests,
            });
        }

        let (sender, receiver) = oneshot::channel();
        debug!(%id, method, timeout_ms = options.timeout.as_millis() as u64, "registering request");
        self.requests
            .insert(id, PendingRequest::new(sender, method, options));
        Ok(receiver)
    }

    /// Deliver a response (or remote error) to the pending request
    ///
    /// The entry is removed before the waiter observes the outcome.
    pub fn correlate(
        &self,
        id: &RequestId,
        outcome: CorrelationResult<Value>,
    ) -> CorrelationResult<()> {
        let (_, pending) =
            self.requests
                .remove(id)
                .ok_or_else(|| CorrelationError::RequestNotFound { id: id.clone() })?;

        trace!(%id, ok = outcome.is_ok(), "correlating response");
        pending
            .sender
            .send(outcome)
            .map_err(|_| CorrelationError::ChannelClosed { id: id.clone() })
    }

    /// Restart the per-request timeout window after a progress
    /// notification, when the request opted in
    ///
    /// Returns whether a pending request with this id exists.
    pub fn record_progress(&self, id: &RequestId) -> bool {
        match self.requests.get_mut(id) {
            Some(mut pending) => {
                if pending.options.reset_timeout_on_progress {
                    pending.reset_window();
                    trace!(%id, "progress reset request timer");
                }
                true
            }
            None => false,
        }
    }

    /// Cancel a pending request, delivering `Cancelled` to its waiter
    ///
    /// Returns the method of the cancelled request so the caller can emit
    /// the matching wire notification.
    pub fn cancel(&self, id: &RequestId, reason: Option<String>) -> Option<String> {
        let (_, pending) = self.requests.remove(id)?;
        debug!(%id, ?reason, "cancelling request");
        let method = pending.method.clone();
        let _ = pending.sender.send(Err(CorrelationError::Cancelled {
            id: id.clone(),
            reason,
        }));
        Some(method)
    }

    /// Remove and return every request whose timer has expired
    ///
    /// Waiters are failed here; the caller emits `notifications/cancelled`
    /// for each returned entry.
    pub fn take_expired(&self) -> Vec<ExpiredRequest> {
        let now = Instant::now();
        let expired_ids: Vec<RequestId> = self
            .requests
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .expired_kind(now)
                    .map(|_| entry.key().clone())
            })
            .collect();

        let mut expired = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            // Re-check under removal; a response may have landed between
            // the scan and now.
            let Some((_, pending)) = self.requests.remove(&id) else {
                continue;
            };
            let Some(kind) = pending.expired_kind(now) else {
                // Progress reset raced the sweep; reinsert untouched.
                self.requests.insert(id, pending);
                continue;
            };
            let elapsed = now.duration_since(pending.registered_at);
            let error = match kind {
                TimeoutKind::PerRequest => CorrelationError::Timeout {
                    id: id.clone(),
                    elapsed_ms: elapsed.as_millis() as u64,
                },
                TimeoutKind::Total => CorrelationError::TotalTimeout {
                    id: id.clone(),
                    limit_ms: pending
                        .options
                        .max_total_timeout
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or_default(),
                },
            };
            debug!(%id, ?kind, elapsed_ms = elapsed.as_millis() as u64, "request expired");
            let _ = pending.sender.send(Err(error));
            expired.push(ExpiredRequest {
                id,
                method: pending.method,
                kind,
                elapsed,
            });
        }
        expired
    }

    /// Fail every pending request with `ConnectionClosed`
    pub fn fail_all_closed(&self) {
        let ids: Vec<RequestId> = self.requests.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, pending)) = self.requests.remove(&id) {
                let _ = pending
                    .sender
                    .send(Err(CorrelationError::ConnectionClosed { id: id.clone() }));
            }
        }
    }

    /// Number of requests awaiting correlation
    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::types::TimeoutKind;
    use serde_json::json;
    use std::time::Duration;

    fn manager() -> CorrelationManager {
        CorrelationManager::new(CorrelationConfig::default())
    }

    #[tokio::test]
    async fn correlates_success() {
        let manager = manager();
        let id = RequestId::Number(1);
        let receiver = manager
            .register(id.clone(), "ping", RequestOptions::default())
            .unwrap();

        manager.correlate(&id, Ok(json!({"ok": true}))).unwrap();
        let outcome = receiver.await.unwrap();
        assert_eq!(outcome.unwrap(), json!({"ok": true}));
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn unknown_id_is_an_error() {
        let manager = manager();
        let result = manager.correlate(&RequestId::Number(99), Ok(json!(null)));
        assert!(matches!(
            result,
            Err(CorrelationError::RequestNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn entry_removed_before_delivery() {
        let manager = manager();
        let id = RequestId::Number(2);
        let receiver = manager
            .register(id.clone(), "ping", RequestOptions::default())
            .unwrap();
        manager.correlate(&id, Ok(json!(1))).unwrap();
        // Second correlation for the same id must report unknown.
        assert!(manager.correlate(&id, Ok(json!(2))).is_err());
        assert!(receiver.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn expiry_delivers_timeout() {
        let manager = manager();
        let id = RequestId::Number(3);
        let receiver = manager
            .register(
                id.clone(),
                "tools/call",
                RequestOptions::with_timeout(Duration::from_millis(5)),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let expired = manager.take_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].kind, TimeoutKind::PerRequest);
        assert_eq!(expired[0].method, "tools/call");
        assert!(matches!(
            receiver.await.unwrap(),
            Err(CorrelationError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn progress_reset_defers_expiry() {
        let manager = manager();
        let id = RequestId::Number(4);
        let _receiver = manager
            .register(
                id.clone(),
                "tools/call",
                RequestOptions {
                    timeout: Duration::from_millis(40),
                    max_total_timeout: None,
                    reset_timeout_on_progress: true,
                },
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(manager.record_progress(&id));
        tokio::time::sleep(Duration::from_millis(25)).await;
        // 50ms wall time, but the window restarted at 25ms.
        assert!(manager.take_expired().is_empty());
        assert_eq!(manager.pending_count(), 1);
    }

    #[tokio::test]
    async fn total_cap_expires_despite_progress() {
        let manager = manager();
        let id = RequestId::Number(5);
        let receiver = manager
            .register(
                id.clone(),
                "tools/call",
                RequestOptions {
                    timeout: Duration::from_millis(50),
                    max_total_timeout: Some(Duration::from_millis(60)),
                    reset_timeout_on_progress: true,
                },
            )
            .unwrap();

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            manager.record_progress(&id);
        }
        let expired = manager.take_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].kind, TimeoutKind::Total);
        assert!(matches!(
            receiver.await.unwrap(),
            Err(CorrelationError::TotalTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_returns_method_and_fails_waiter() {
        let manager = manager();
        let id = RequestId::Number(6);
        let receiver = manager
            .register(id.clone(), "tools/call", RequestOptions::default())
            .unwrap();

        let method = manager.cancel(&id, Some("user abort".to_string()));
        assert_eq!(method.as_deref(), Some("tools/call"));
        assert!(matches!(
            receiver.await.unwrap(),
            Err(CorrelationError::Cancelled { .. })
        ));
        // Cancel of an unknown id is a no-op.
        assert!(manager.cancel(&id, None).is_none());
    }

    #[tokio::test]
    async fn fail_all_closed_drains_table() {
        let manager = manager();
        let first = manager
            .register(RequestId::Number(7), "a", RequestOptions::default())
            .unwrap();
        let second = manager
            .register(RequestId::Number(8), "b", RequestOptions::default())
            .unwrap();

        manager.fail_all_closed();
        assert_eq!(manager.pending_count(), 0);
        assert!(matches!(
            first.await.unwrap(),
            Err(CorrelationError::ConnectionClosed { .. })
        ));
        assert!(matches!(
            second.await.unwrap(),
            Err(CorrelationError::ConnectionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn capacity_limit_enforced() {
        let manager = CorrelationManager::new(CorrelationConfig {
            max_pending_requests: 1,
        });
        let _first = manager
            .register(RequestId::Number(9), "a", RequestOptions::default())
            .unwrap();
        let second = manager.register(RequestId::Number(10), "b", RequestOptions::default());
        assert!(matches!(
            second,
            Err(CorrelationError::CapacityExceeded { .. })
        ));
    }
}
