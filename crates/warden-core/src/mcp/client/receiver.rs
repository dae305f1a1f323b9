//! Background message receiver for MCP client

use super::notification::NotificationHandler;
use crate::mcp::codec::LineCodec;
use crate::mcp::correlator::RpcCorrelator;
use crate::mcp::error::McpError;
use crate::mcp::protocol::{McpMessage, McpRequest, McpResponse, McpRpcError};
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Log target for worker stderr lines
pub(crate) const STDERR_TARGET: &str = "warden::mcp::stderr";

/// Shared session state the receiver tears down when output ends
#[derive(Clone)]
pub(super) struct SessionState {
    pub(super) server_name: Arc<str>,
    pub(super) correlator: Arc<RpcCorrelator>,
    pub(super) closed: CancellationToken,
    pub(super) close_reason: Arc<SyncMutex<Option<String>>>,
    /// Frames waiting for the writer task
    pub(super) outbox: mpsc::UnboundedSender<Vec<u8>>,
}

impl SessionState {
    /// Mark the session closed and fail everything still waiting.
    ///
    /// The token is cancelled before the table is drained so a request that
    /// registers concurrently either sees the token or gets rejected here.
    pub(super) fn shutdown(&self, reason: &str) {
        {
            let mut close_reason = self.close_reason.lock();
            if close_reason.is_none() {
                *close_reason = Some(reason.to_string());
            }
        }
        self.closed.cancel();

        let rejected = self
            .correlator
            .reject_all(&McpError::connection_closed(reason));
        if rejected > 0 {
            debug!(server = %self.server_name, rejected, "rejected pending requests");
        }
    }

    /// Queue one encoded frame for the writer task
    pub(super) fn enqueue(&self, frame: Vec<u8>) -> Result<(), McpError> {
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }
        self.outbox.send(frame).map_err(|_| self.closed_error())
    }

    /// Error returned to callers once the session is gone
    pub(super) fn closed_error(&self) -> McpError {
        let reason = self
            .close_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "session closed".to_string());
        McpError::connection_closed(reason)
    }
}

/// Background task that decodes output chunks and routes messages
pub(super) async fn message_receiver(
    state: SessionState,
    handler: Arc<dyn NotificationHandler>,
    mut output: mpsc::Receiver<Vec<u8>>,
    mut codec: LineCodec,
) {
    loop {
        tokio::select! {
            _ = state.closed.cancelled() => {
                debug!(server = %state.server_name, "MCP message receiver shutting down");
                break;
            }
            chunk = output.recv() => {
                let Some(chunk) = chunk else {
                    debug!(server = %state.server_name, "MCP server closed its output stream");
                    state.shutdown("server exited");
                    break;
                };

                let messages = codec.feed(&chunk, |err| {
                    warn!(server = %state.server_name, "skipping malformed frame: {}", err);
                });

                for message in messages {
                    dispatch(&state, handler.as_ref(), message);
                }
            }
        }
    }
}

fn dispatch(
    state: &SessionState,
    handler: &dyn NotificationHandler,
    message: McpMessage,
) {
    match message {
        McpMessage::Response(response) => {
            state.correlator.resolve(response);
        }
        McpMessage::Notification(notification) => {
            handler.handle(
                &state.server_name,
                &notification.method,
                notification.params,
            );
        }
        McpMessage::Request(request) => {
            reject_server_request(state, request);
        }
    }
}

/// This client serves no methods; answer so the worker is not left waiting
fn reject_server_request(state: &SessionState, request: McpRequest) {
    warn!(
        server = %state.server_name,
        method = %request.method,
        "rejecting server-initiated request"
    );

    let reply = McpResponse::error(request.id, McpRpcError::method_not_found());
    let bytes = match LineCodec::encode(&reply.into()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(server = %state.server_name, "failed to encode reply: {}", e);
            return;
        }
    };

    if let Err(e) = state.enqueue(bytes) {
        debug!(server = %state.server_name, "failed to reply to server request: {}", e);
    }
}

/// Forward worker stderr to tracing, one line per event
pub(super) async fn diagnostics_logger(
    server_name: Arc<str>,
    mut diagnostics: mpsc::Receiver<Vec<u8>>,
) {
    let mut pending = Vec::new();

    while let Some(chunk) = diagnostics.recv().await {
        pending.extend_from_slice(&chunk);
        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            log_stderr_line(&server_name, &line);
        }
    }

    if !pending.is_empty() {
        log_stderr_line(&server_name, &pending);
    }
}

fn log_stderr_line(server_name: &str, line: &[u8]) {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end();
    if !line.is_empty() {
        debug!(target: STDERR_TARGET, server = %server_name, "{}", line);
    }
}
