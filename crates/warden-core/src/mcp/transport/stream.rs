//! Transport over an arbitrary async reader/writer pair
//!
//! Used for in-process servers and tests, typically with
//! [`tokio::io::duplex`].

use super::{McpTransport, pump_reader};
use crate::mcp::error::McpError;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Stream-backed transport
pub struct StreamTransport {
    writer: Option<Box<dyn AsyncWrite + Send + Sync + Unpin>>,
    output: Option<mpsc::Receiver<Vec<u8>>>,
    alive: bool,
}

impl StreamTransport {
    /// Wrap `reader` (server output) and `writer` (server input)
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Sync + Unpin + 'static,
    {
        Self {
            writer: Some(Box::new(writer)),
            output: Some(pump_reader(reader, "stream")),
            alive: true,
        }
    }
}

#[async_trait]
impl McpTransport for StreamTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), McpError> {
        let writer = self.writer.as_mut().ok_or(McpError::NotConnected)?;

        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;

        result.map_err(|e| {
            self.alive = false;
            McpError::transport(format!("stream write failed: {}", e))
        })
    }

    fn take_output(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.output.take()
    }

    fn take_diagnostics(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        None
    }

    async fn kill(&mut self) -> Result<(), McpError> {
        self.alive = false;
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let (client_side, mut server_side) = tokio::io::duplex(256);
        let (reader, writer) = tokio::io::split(client_side);
        let mut transport = StreamTransport::new(reader, writer);

        transport.write(b"{}\n").await.unwrap();
        let mut buf = [0u8; 3];
        server_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"{}\n");
    }

    #[tokio::test]
    async fn test_kill_is_idempotent() {
        let (client_side, _server_side) = tokio::io::duplex(256);
        let (reader, writer) = tokio::io::split(client_side);
        let mut transport = StreamTransport::new(reader, writer);

        assert!(transport.is_alive());
        transport.kill().await.unwrap();
        transport.kill().await.unwrap();
        assert!(!transport.is_alive());
        assert!(matches!(
            transport.write(b"x").await,
            Err(McpError::NotConnected)
        ));
    }
}
