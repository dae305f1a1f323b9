//! Background frame writer for MCP client

use super::receiver::SessionState;
use crate::mcp::transport::McpTransport;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

/// Background task that writes queued frames in order.
///
/// The transport is locked only while a frame is in flight, and that write
/// is abandoned as soon as the session closes.
pub(super) async fn frame_writer(
    state: SessionState,
    transport: Arc<Mutex<Box<dyn McpTransport>>>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = state.closed.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let written = tokio::select! {
            biased;
            _ = state.closed.cancelled() => break,
            written = async { transport.lock().await.write(&frame).await } => written,
        };

        if let Err(e) = written {
            warn!(server = %state.server_name, "write failed: {}", e);
            state.shutdown(&format!("write failed: {}", e));
            break;
        }
    }
    debug!(server = %state.server_name, "MCP frame writer stopped");
}
