//! Server-Role Stdio Transport
//!
//! Reads JSON-RPC frames from stdin and writes responses to stdout,
//! flushing after every frame. Generic over the reader/writer pair so
//! tests can inject in-memory streams.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Stdin, Stdout};
use tokio::sync::broadcast;
use tracing::{debug, trace};

// Layer 3: Internal module imports
use crate::protocol::errors::ProtocolError;
use crate::protocol::{JsonRpcMessage, JsonRpcMessageTrait};
use crate::transport::buffer::ReadBuffer;
use crate::transport::{
    ConnectionState, MessageContext, MessageHandler, SendOptions, Transport, TransportBuilder,
    TransportError,
};

/// Default stdin type for production use
pub type DefaultStdin = Stdin;

/// Default stdout type for production use
pub type DefaultStdout = Stdout;

/// Stdio transport generic over its I/O streams
///
/// # Architecture
///
/// ```text
/// reader -> ReadBuffer -> MessageHandler      (background task)
/// send() -> writer (+ flush per frame)
/// ```
pub struct StdioTransport<R = DefaultStdin, W = DefaultStdout>
where
    R: AsyncRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    message_handler: Option<Arc<dyn MessageHandler>>,
    reader: Option<R>,
    writer: Option<W>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    close_reported: Arc<AtomicBool>,
    session_id: String,
    is_running: bool,
}

impl StdioTransport<DefaultStdin, DefaultStdout> {
    /// Production transport on the process's own stdio
    pub fn new() -> Self {
        Self::with_streams(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport<DefaultStdin, DefaultStdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    /// Transport over custom streams (dependency injection for tests)
    pub fn with_streams(reader: R, writer: W) -> Self {
        Self {
            message_handler: None,
            reader: Some(reader),
            writer: Some(writer),
            shutdown_tx: None,
            task_handle: None,
            close_reported: Arc::new(AtomicBool::new(false)),
            session_id: "stdio".to_string(),
            is_running: false,
        }
    }

    /// Wait for the background reader to finish (EOF or shutdown)
    pub async fn wait_for_completion(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.task_handle.take() {
            task.await.map_err(|e| TransportError::Connection {
                message: format!("reader task failed: {e}"),
            })?;
            self.is_running = false;
        }
        Ok(())
    }
}

#[async_trait]
impl<R, W> Transport for StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn start(&mut self) -> Result<(), TransportError> {
        if self.is_running {
            return Err(TransportError::connection("transport already running"));
        }
        let handler = self
            .message_handler
            .as_ref()
            .ok_or_else(|| TransportError::connection("no message handler configured"))?
            .clone();
        let reader = self
            .reader
            .take()
            .ok_or_else(|| TransportError::connection("transport already consumed"))?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let session_id = self.session_id.clone();
        let close_reported = Arc::clone(&self.close_reported);
        self.task_handle = Some(tokio::spawn(async move {
            reader_loop(reader, handler, session_id, shutdown_rx, close_reported).await;
        }));
        self.is_running = true;
        Ok(())
    }

    async fn send(
        &mut self,
        message: JsonRpcMessage,
        _options: SendOptions,
    ) -> Result<(), TransportError> {
        if !self.is_running {
            return Err(TransportError::Closed);
        }
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        let bytes = message.to_bytes()?;
        writer.write_all(&bytes).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        trace!(bytes = bytes.len(), "stdio frame written");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_running {
            return Ok(());
        }
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task_handle.take() {
            let _ = task.await;
        }
        // Closing the writer half is the shutdown signal to the peer.
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.is_running = false;
        self.shutdown_tx = None;
        if !self.close_reported.swap(true, Ordering::SeqCst) {
            if let Some(handler) = &self.message_handler {
                handler.handle_close().await;
            }
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        if self.is_running {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }

    fn transport_type(&self) -> &'static str {
        "stdio"
    }
}

/// Background loop: read chunks, frame them, dispatch messages
///
/// Frames that fail to parse are reported through `handle_error` and the
/// connection continues; an oversized partial frame clears the buffer.
/// EOF reports close exactly once.
pub(crate) async fn reader_loop<R>(
    mut reader: R,
    handler: Arc<dyn MessageHandler>,
    session_id: String,
    mut shutdown_rx: broadcast::Receiver<()>,
    close_reported: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin + Send + Sync + 'static,
{
    let mut read_buffer = ReadBuffer::new();
    let mut chunk = vec![0u8; 8192];
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("stdio reader shutting down");
                break;
            }
            read = reader.read(&mut chunk) => {
                match read {
                    Ok(0) => {
                        debug!("stdio reached EOF");
                        if !close_reported.swap(true, Ordering::SeqCst) {
                            handler.handle_close().await;
                        }
                        break;
                    }
                    Ok(n) => {
                        read_buffer.append(&chunk[..n]);
                        drain_frames(&mut read_buffer, &handler, &session_id).await;
                    }
                    Err(error) => {
                        handler.handle_error(TransportError::Io { source: error }).await;
                        if !close_reported.swap(true, Ordering::SeqCst) {
                            handler.handle_close().await;
                        }
                        break;
                    }
                }
            }
        }
    }
}

async fn drain_frames(
    read_buffer: &mut ReadBuffer,
    handler: &Arc<dyn MessageHandler>,
    session_id: &str,
) {
    loop {
        match read_buffer.read_message() {
            Ok(Some(message)) => {
                let context = MessageContext::new(session_id.to_string());
                handler.handle_message(message, context).await;
            }
            Ok(None) => break,
            Err(error @ ProtocolError::FrameTooLarge { .. }) => {
                read_buffer.clear();
                handler
                    .handle_error(TransportError::protocol(error.to_string()))
                    .await;
                break;
            }
            Err(error) => {
                // Bad frame: report and keep reading (robustness for
                // notifications).
                handler
                    .handle_error(TransportError::protocol(error.to_string()))
                    .await;
            }
        }
    }
}

/// Builder for pre-configured stdio transports
pub struct StdioTransportBuilder<R = DefaultStdin, W = DefaultStdout>
where
    R: AsyncRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    transport: StdioTransport<R, W>,
}

impl StdioTransportBuilder<DefaultStdin, DefaultStdout> {
    /// Builder for the process's own stdio
    pub fn new() -> Self {
        Self {
            transport: StdioTransport::new(),
        }
    }
}

impl Default for StdioTransportBuilder<DefaultStdin, DefaultStdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransportBuilder<R, W>
where
    R: AsyncRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    /// Builder over custom streams
    pub fn with_streams(reader: R, writer: W) -> Self {
        Self {
            transport: StdioTransport::with_streams(reader, writer),
        }
    }
}

impl<R, W> TransportBuilder for StdioTransportBuilder<R, W>
where
    R: AsyncRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    type Transport = StdioTransport<R, W>;

    fn with_message_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.transport.message_handler = Some(handler);
        self
    }

    async fn build(self) -> Result<Self::Transport, TransportError> {
        if self.transport.message_handler.is_none() {
            return Err(TransportError::connection("no message handler configured"));
        }
        Ok(self.transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::JsonRpcNotification;
    use std::sync::Mutex;
    use tokio::io::duplex;

    struct Recorder {
        messages: Arc<Mutex<Vec<JsonRpcMessage>>>,
        errors: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle_message(&self, message: JsonRpcMessage, _context: MessageContext) {
            self.messages.lock().unwrap().push(message);
        }
        async fn handle_error(&self, error: TransportError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
        async fn handle_close(&self) {}
    }

    #[tokio::test]
    async fn frames_inbound_chunks_and_survives_bad_frames() {
        let (remote, local) = duplex(1024);
        let (mut remote_read_half, mut remote_write) = tokio::io::split(remote);
        let (local_read, local_write) = tokio::io::split(local);

        let messages = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(Recorder {
            messages: Arc::clone(&messages),
            errors: Arc::clone(&errors),
        });

        let mut transport = StdioTransportBuilder::with_streams(local_read, local_write)
            .with_message_handler(handler)
            .build()
            .await
            .unwrap();
        transport.start().await.unwrap();

        remote_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"first\"}\nnot json\n{\"jsonrpc\":\"2.0\",\"method\":\"second\"}\n")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        {
            let seen = messages.lock().unwrap();
            let methods: Vec<_> = seen.iter().filter_map(|m| m.method()).collect();
            assert_eq!(methods, vec!["first", "second"]);
            assert_eq!(errors.lock().unwrap().len(), 1);
        }

        // Outbound frames are newline-terminated and flushed.
        transport
            .send(
                JsonRpcMessage::Notification(JsonRpcNotification::new("out", None)),
                SendOptions::default(),
            )
            .await
            .unwrap();
        let mut read_back = vec![0u8; 256];
        let n = remote_read_half.read(&mut read_back).await.unwrap();
        let wire = String::from_utf8_lossy(&read_back[..n]).to_string();
        assert!(wire.ends_with('\n'));
        assert!(wire.contains("\"out\""));

        transport.close().await.unwrap();
    }
}
