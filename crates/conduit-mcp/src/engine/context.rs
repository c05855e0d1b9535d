//! Per-Request Handler Context
//!
//! Every inbound request handler receives a [`RequestContext`]: the
//! request id and metadata, a cancellation signal, and a [`Peer`] handle
//! whose traffic is bound to the originating request so multi-stream
//! transports can associate it.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use serde_json::Value;
use tokio_util::sync::CancellationToken;

// Layer 3: Internal module imports
use crate::engine::error::McpResult;
use crate::engine::{EngineCore, OutgoingRequestOptions};
use crate::protocol::constants::notifications;
use crate::protocol::{ProgressNotification, ProgressToken, RequestId};

/// Context handed to request handlers
///
/// Cancellation is cooperative: handlers should check
/// [`RequestContext::is_cancelled`] or await
/// [`RequestContext::cancelled`] at suspension points. After cancellation
/// the engine discards any response the handler still produces.
#[derive(Clone)]
pub struct RequestContext {
    pub(crate) request_id: RequestId,
    pub(crate) session_id: Option<String>,
    pub(crate) meta: Option<Value>,
    pub(crate) progress_token: Option<ProgressToken>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) peer: Peer,
}

impl RequestContext {
    /// Id of the inbound request being handled
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Session id the request arrived on, if the transport tracks one
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The request's `_meta` object, if present
    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }

    /// Progress token the caller supplied, if any
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    /// Whether the request has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Suspend until the request is cancelled
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// The raw cancellation token, for select!-style composition
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Handle for traffic related to this request
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Emit a progress notification against the caller's progress token
    ///
    /// Silently does nothing when the caller did not opt into progress.
    pub async fn send_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> McpResult<()> {
        let Some(token) = self.progress_token.clone() else {
            return Ok(());
        };
        let params = ProgressNotification {
            progress_token: token,
            progress,
            total,
            message,
        };
        self.peer
            .send_notification(notifications::PROGRESS, Some(serde_json::to_value(params)?))
            .await
    }
}

/// Handle to the remote peer, bound to an originating request
///
/// Notifications and requests sent through this handle carry the inbound
/// request id as `related_request_id`, letting transports such as
/// streamable HTTP route them into the stream the request arrived on.
#[derive(Clone)]
pub struct Peer {
    pub(crate) engine: Arc<EngineCore>,
    pub(crate) related: Option<RequestId>,
}

impl Peer {
    /// Send a notification to the peer
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.engine
            .notify_related(method, params, self.related.clone())
            .await
    }

    /// Issue a request to the peer and await its result
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        mut options: OutgoingRequestOptions,
    ) -> McpResult<Value> {
        options.related_request_id = self.related.clone();
        self.engine.request(method, params, options).await
    }
}
