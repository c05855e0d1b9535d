//! Protocol engine integration tests over the in-memory transport pair:
//! correlation, cancellation, and timeout policy between two live engines.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

use conduit_mcp::engine::{
    EngineConfig, McpError, McpResult, OutgoingRequestOptions, ProtocolEngine, RequestContext,
    RequestHandler,
};
use conduit_mcp::correlation::RequestOptions;
use conduit_mcp::protocol::RequestId;
use conduit_mcp::transport::inmemory::InMemoryTransport;
use conduit_mcp::transport::{SharedTransport, Transport, TransportBuilder, TransportSender};

/// Wire an engine to one half of an in-memory pair and start it.
async fn engine_on(half: InMemoryTransport) -> (ProtocolEngine, SharedTransport) {
    let sender = TransportSender::unbound();
    let engine = ProtocolEngine::new(sender.clone(), EngineConfig::default());
    let transport = half
        .with_message_handler(engine.message_handler())
        .build()
        .await
        .unwrap();
    let shared: SharedTransport = Arc::new(AsyncMutex::new(Box::new(transport) as Box<dyn Transport>));
    sender.bind(&shared);
    shared.lock().await.start().await.unwrap();
    (engine, shared)
}

struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle(&self, params: Option<Value>, _context: RequestContext) -> McpResult<Value> {
        Ok(params.unwrap_or(Value::Null))
    }
}

/// Waits until cancelled, records that it observed the cancellation, and
/// returns; the engine must suppress its response.
struct SlowHandler {
    cancelled_seen: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

#[async_trait]
impl RequestHandler for SlowHandler {
    async fn handle(&self, _params: Option<Value>, context: RequestContext) -> McpResult<Value> {
        tokio::select! {
            _ = context.cancelled() => {
                self.cancelled_seen.store(true, Ordering::SeqCst);
            }
            _ = tokio::time::sleep(Duration::from_secs(10)) => {}
        }
        self.finished.store(true, Ordering::SeqCst);
        Ok(json!({"should": "never reach the peer"}))
    }
}

/// Emits progress every 40ms for ~8 ticks, then succeeds.
struct ProgressingHandler;

#[async_trait]
impl RequestHandler for ProgressingHandler {
    async fn handle(&self, _params: Option<Value>, context: RequestContext) -> McpResult<Value> {
        for tick in 0..8u32 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            context
                .send_progress(f64::from(tick + 1), Some(8.0), None)
                .await?;
        }
        Ok(json!({"done": true}))
    }
}

#[tokio::test]
async fn request_response_round_trip() {
    let (client_end, server_end) = InMemoryTransport::pair();
    let (server, _server_transport) = engine_on(server_end).await;
    let (client, _client_transport) = engine_on(client_end).await;

    server
        .core()
        .set_request_handler("echo", Arc::new(EchoHandler))
        .unwrap();

    let result = client
        .request(
            "echo",
            Some(json!({"x": 1})),
            OutgoingRequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({"x": 1}));
    assert_eq!(client.core().pending_count(), 0);
}

#[tokio::test]
async fn ping_answered_built_in() {
    let (client_end, server_end) = InMemoryTransport::pair();
    let (_server, _st) = engine_on(server_end).await;
    let (client, _ct) = engine_on(client_end).await;

    let result = client
        .request("ping", None, OutgoingRequestOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!({}));
}

#[tokio::test]
async fn unknown_method_yields_method_not_found() {
    let (client_end, server_end) = InMemoryTransport::pair();
    let (_server, _st) = engine_on(server_end).await;
    let (client, _ct) = engine_on(client_end).await;

    let error = client
        .request("no/such/method", None, OutgoingRequestOptions::default())
        .await
        .unwrap_err();
    match error {
        McpError::Remote { error } => assert_eq!(error.code, -32601),
        other => panic!("expected remote error, got {other}"),
    }
}

#[tokio::test]
async fn cancellation_aborts_handler_and_suppresses_response() {
    let (client_end, server_end) = InMemoryTransport::pair();
    let (server, _st) = engine_on(server_end).await;
    let (client, _ct) = engine_on(client_end).await;

    let cancelled_seen = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    server
        .core()
        .set_request_handler(
            "slow",
            Arc::new(SlowHandler {
                cancelled_seen: Arc::clone(&cancelled_seen),
                finished: Arc::clone(&finished),
            }),
        )
        .unwrap();

    let client_core = client.core();
    let request = tokio::spawn(async move {
        client_core
            .request("slow", None, OutgoingRequestOptions::default())
            .await
    });

    // Let the request reach the handler, then cancel it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    client
        .cancel_request(&RequestId::Number(0), Some("user abort".to_string()))
        .await;

    let outcome = request.await.unwrap();
    match outcome {
        Err(McpError::Cancelled { reason }) => {
            assert_eq!(reason.as_deref(), Some("user abort"));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }

    // The server-side handler observed the abort and its (suppressed)
    // response never resurfaces as an unknown id on the client.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cancelled_seen.load(Ordering::SeqCst));
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(client.core().pending_count(), 0);
}

#[tokio::test]
async fn timeout_without_progress_reset_fails() {
    let (client_end, server_end) = InMemoryTransport::pair();
    let (server, _st) = engine_on(server_end).await;
    let (client, _ct) = engine_on(client_end).await;

    server
        .core()
        .set_request_handler("slow/progress", Arc::new(ProgressingHandler))
        .unwrap();

    let error = client
        .request(
            "slow/progress",
            None,
            OutgoingRequestOptions {
                request: RequestOptions {
                    timeout: Duration::from_millis(100),
                    max_total_timeout: None,
                    reset_timeout_on_progress: false,
                },
                on_progress: None,
                related_request_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(error, McpError::RequestTimeout { .. }));
}

#[tokio::test]
async fn progress_resets_per_request_timer() {
    let (client_end, server_end) = InMemoryTransport::pair();
    let (server, _st) = engine_on(server_end).await;
    let (client, _ct) = engine_on(client_end).await;

    server
        .core()
        .set_request_handler("slow/progress", Arc::new(ProgressingHandler))
        .unwrap();

    let progress_count = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&progress_count);
    let result = client
        .request(
            "slow/progress",
            None,
            OutgoingRequestOptions {
                request: RequestOptions {
                    timeout: Duration::from_millis(150),
                    max_total_timeout: Some(Duration::from_secs(5)),
                    reset_timeout_on_progress: true,
                },
                on_progress: Some(Arc::new(move |_notification| {
                    seen.fetch_add(1, Ordering::SeqCst);
                })),
                related_request_id: None,
            },
        )
        .await
        .unwrap();

    // ~320ms of handler work beat the 150ms window because each progress
    // notification restarted it.
    assert_eq!(result, json!({"done": true}));
    assert!(progress_count.load(Ordering::SeqCst) >= 6);
}

#[tokio::test]
async fn max_total_timeout_is_fatal_despite_progress() {
    let (client_end, server_end) = InMemoryTransport::pair();
    let (server, _st) = engine_on(server_end).await;
    let (client, _ct) = engine_on(client_end).await;

    server
        .core()
        .set_request_handler("slow/progress", Arc::new(ProgressingHandler))
        .unwrap();

    let error = client
        .request(
            "slow/progress",
            None,
            OutgoingRequestOptions {
                request: RequestOptions {
                    timeout: Duration::from_millis(150),
                    max_total_timeout: Some(Duration::from_millis(200)),
                    reset_timeout_on_progress: true,
                },
                on_progress: Some(Arc::new(|_notification| {})),
                related_request_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(error, McpError::RequestTimeout { .. }));
}

#[tokio::test]
async fn transport_close_fails_pending_requests() {
    let (client_end, server_end) = InMemoryTransport::pair();
    let (server, server_transport) = engine_on(server_end).await;
    let (client, _ct) = engine_on(client_end).await;

    let cancelled_seen = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    server
        .core()
        .set_request_handler(
            "slow",
            Arc::new(SlowHandler {
                cancelled_seen,
                finished,
            }),
        )
        .unwrap();

    let client_core = client.core();
    let request = tokio::spawn(async move {
        client_core
            .request("slow", None, OutgoingRequestOptions::default())
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Server goes away; the in-memory pair propagates the close.
    server_transport.lock().await.close().await.unwrap();

    let outcome = request.await.unwrap();
    assert!(matches!(outcome, Err(McpError::ConnectionClosed)));
    assert_eq!(client.core().pending_count(), 0);
}
