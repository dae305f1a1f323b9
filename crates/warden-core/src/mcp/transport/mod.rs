//! MCP transport layer implementations
//!
//! A transport owns one worker and its byte streams. It knows nothing about
//! framing: output and diagnostic bytes are delivered as raw chunks in
//! arrival order.
//!
//! ## Available Transports
//!
//! - **Stdio**: spawns a local worker process and talks over its pipes
//! - **Stream**: wraps any async reader/writer pair (in-process servers, tests)

pub mod stdio;
pub mod stream;

pub use stdio::StdioTransport;
pub use stream::StreamTransport;

use super::error::McpError;
use crate::config::ServerConfig;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Size of a single read from an output stream
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Chunks buffered between a pump task and its consumer
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Default time a worker gets between SIGTERM and SIGKILL
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(2_000);

/// Byte-stream transport for one worker
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Append bytes to the worker's input stream
    async fn write(&mut self, bytes: &[u8]) -> Result<(), McpError>;

    /// Output stream chunks. Yields `Some` once; the channel closes at EOF.
    fn take_output(&mut self) -> Option<mpsc::Receiver<Vec<u8>>>;

    /// Diagnostic stream chunks, if the transport has one
    fn take_diagnostics(&mut self) -> Option<mpsc::Receiver<Vec<u8>>>;

    /// Terminate the worker. Idempotent.
    async fn kill(&mut self) -> Result<(), McpError>;

    /// Whether the worker is still running
    fn is_alive(&mut self) -> bool;

    /// OS process id, for process-backed transports
    fn pid(&self) -> Option<u32> {
        None
    }
}

/// Creates transports for validated server configs
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a transport for `name`
    async fn open(
        &self,
        name: &str,
        config: &ServerConfig,
    ) -> Result<Box<dyn McpTransport>, McpError>;
}

/// Factory that spawns local workers as child processes
#[derive(Debug, Clone)]
pub struct ProcessTransportFactory {
    shutdown_grace: Duration,
}

impl ProcessTransportFactory {
    /// Create a factory with the default shutdown grace period
    pub fn new() -> Self {
        Self {
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Set how long workers get to exit after SIGTERM
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

impl Default for ProcessTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for ProcessTransportFactory {
    async fn open(
        &self,
        name: &str,
        config: &ServerConfig,
    ) -> Result<Box<dyn McpTransport>, McpError> {
        match config {
            ServerConfig::Local { command, args, env } => {
                debug!(server = %name, command = %command, "spawning MCP server");
                let transport = StdioTransport::spawn_with_env(command, args, env)?
                    .with_shutdown_grace(self.shutdown_grace);
                Ok(Box::new(transport))
            }
            ServerConfig::Remote { url, .. } => Err(McpError::unsupported(format!(
                "remote transport for '{}' ({}) is not available",
                name, url
            ))),
        }
    }
}

/// Forward everything read from `reader` into a channel until EOF
pub(crate) fn pump_reader<R>(mut reader: R, stream: &'static str) -> mpsc::Receiver<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_BYTES];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if sender.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(stream, "read failed: {}", e);
                    break;
                }
            }
        }
        debug!(stream, "stream closed");
    });

    receiver
}
