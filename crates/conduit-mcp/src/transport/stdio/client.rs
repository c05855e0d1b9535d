//! Client-Role Stdio Transport
//!
//! Spawns a context server as a child process with stdio piped: frames go
//! to the child's stdin, arrive from its stdout, and stderr is optionally
//! captured line-by-line for diagnostics. Closing the child's stdin is
//! the orderly shutdown signal; the child is killed if it lingers.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::broadcast;
use tracing::{debug, warn};

// Layer 3: Internal module imports
use crate::protocol::{JsonRpcMessage, JsonRpcMessageTrait};
use crate::transport::stdio::transport::reader_loop;
use crate::transport::{
    ConnectionState, MessageHandler, SendOptions, Transport, TransportBuilder, TransportError,
};

/// Callback receiving captured child stderr lines
pub type StderrLineCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Child-process stdio transport
pub struct StdioClientTransport {
    program: String,
    args: Vec<String>,
    envs: HashMap<String, String>,
    capture_stderr: bool,
    on_stderr_line: Option<StderrLineCallback>,

    message_handler: Option<Arc<dyn MessageHandler>>,
    child: Option<Child>,
    child_stdin: Option<ChildStdin>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    reader_task: Option<tokio::task::JoinHandle<()>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
    close_reported: Arc<AtomicBool>,
    is_running: bool,
}

#[async_trait]
impl Transport for StdioClientTransport {
    async fn start(&mut self) -> Result<(), TransportError> {
        if self.is_running {
            return Err(TransportError::connection("transport already running"));
        }
        let handler = self
            .message_handler
            .as_ref()
            .ok_or_else(|| TransportError::connection("no message handler configured"))?
            .clone();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.envs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if self.capture_stderr {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| TransportError::Connection {
            message: format!("failed to spawn {}: {e}", self.program),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::connection("child stdout not piped"))?;
        self.child_stdin = child.stdin.take();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let close_reported = Arc::clone(&self.close_reported);
        let session_id = format!("stdio-child:{}", self.program);
        self.reader_task = Some(tokio::spawn(async move {
            reader_loop(stdout, handler, session_id, shutdown_rx, close_reported).await;
        }));

        if self.capture_stderr {
            if let Some(stderr) = child.stderr.take() {
                let on_line = self.on_stderr_line.clone();
                let program = self.program.clone();
                self.stderr_task = Some(tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(child = %program, line = %line, "child stderr");
                        if let Some(callback) = &on_line {
                            callback(&line);
                        }
                    }
                }));
            }
        }

        self.child = Some(child);
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
        let stdin = self.child_stdin.as_mut().ok_or(TransportError::Closed)?;
        let bytes = message.to_bytes()?;
        stdin.write_all(&bytes).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_running {
            return Ok(());
        }
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(());
        }

        // Dropping stdin closes the writer half: the orderly shutdown
        // signal for a context server.
        self.child_stdin = None;

        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "child exited"),
                Ok(Err(error)) => warn!(%error, "error awaiting child"),
                Err(_) => {
                    warn!("child did not exit in time, killing");
                    let _ = child.kill().await;
                }
            }
        }

        if let Some(task) = self.reader_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
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

    fn transport_type(&self) -> &'static str {
        "stdio-client"
    }
}

/// Builder for the child-process stdio transport
pub struct StdioClientTransportBuilder {
    transport: StdioClientTransport,
}

impl StdioClientTransportBuilder {
    /// Builder for launching `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            transport: StdioClientTransport {
                program: program.into(),
                args: Vec::new(),
                envs: HashMap::new(),
                capture_stderr: false,
                on_stderr_line: None,
                message_handler: None,
                child: None,
                child_stdin: None,
                shutdown_tx: None,
                reader_task: None,
                stderr_task: None,
                close_reported: Arc::new(AtomicBool::new(false)),
                is_running: false,
            },
        }
    }

    /// Append command-line arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transport.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.transport.envs.insert(key.into(), value.into());
        self
    }

    /// Capture child stderr and forward lines to the callback
    pub fn capture_stderr(mut self, on_line: Option<StderrLineCallback>) -> Self {
        self.transport.capture_stderr = true;
        self.transport.on_stderr_line = on_line;
        self
    }
}

impl TransportBuilder for StdioClientTransportBuilder {
    type Transport = StdioClientTransport;

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
