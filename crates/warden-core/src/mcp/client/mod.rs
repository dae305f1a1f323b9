//! MCP client implementation
//!
//! One live session with one worker: transport, codec, correlator and
//! handshake wired together.
//!
//! # Features
//! - Concurrent request support with proper message routing
//! - Request timeout handling with a best-effort cancellation notice
//! - Notification handling
//! - Background message receiver that fails every waiter when output ends
//! - Background frame writer, so a worker that stops reading never blocks
//!   callers, deadlines or teardown

mod notification;
mod receiver;
mod writer;

pub use notification::{LoggingNotificationHandler, NotificationHandler};

use super::codec::{DEFAULT_MAX_FRAME_BYTES, LineCodec};
use super::correlator::{DEFAULT_REQUEST_TIMEOUT, RpcCorrelator};
use super::error::McpError;
use super::handshake::{Handshake, HandshakeChannel, HandshakeState};
use super::protocol::{McpMessage, McpNotification, McpRequest, RequestId, methods};
use super::transport::McpTransport;
use super::types::{InitializeParams, InitializeResult, McpServerInfo};
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use receiver::SessionState;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Session settings
#[derive(Clone)]
pub struct ClientOptions {
    /// Default per-request deadline
    pub request_timeout: Duration,
    /// What the client advertises in `initialize`
    pub init_params: InitializeParams,
    /// Receives server notifications
    pub notification_handler: Arc<dyn NotificationHandler>,
    /// Largest accepted inbound frame
    pub max_frame_bytes: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            init_params: InitializeParams::default(),
            notification_handler: Arc::new(LoggingNotificationHandler),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl ClientOptions {
    /// Set the default request deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the notification handler
    pub fn with_notification_handler(mut self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.notification_handler = handler;
        self
    }
}

/// MCP client for communicating with one MCP server
pub struct McpClient {
    /// Transport layer, shared with the writer task
    transport: Arc<Mutex<Box<dyn McpTransport>>>,
    state: SessionState,
    handshake: Handshake,
    pid: Option<u32>,
    /// Writer, receiver and stderr tasks
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl McpClient {
    /// Wrap `transport` and start the background receiver.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        server_name: impl Into<String>,
        mut transport: Box<dyn McpTransport>,
        options: ClientOptions,
    ) -> Self {
        let server_name: Arc<str> = Arc::from(server_name.into());
        let pid = transport.pid();
        let output = transport.take_output();
        let diagnostics = transport.take_diagnostics();
        let transport = Arc::new(Mutex::new(transport));
        let (outbox, frames) = mpsc::unbounded_channel();

        let state = SessionState {
            server_name: Arc::clone(&server_name),
            correlator: Arc::new(RpcCorrelator::new(options.request_timeout)),
            closed: CancellationToken::new(),
            close_reason: Arc::new(SyncMutex::new(None)),
            outbox,
        };

        let mut tasks = Vec::with_capacity(3);
        tasks.push(tokio::spawn(writer::frame_writer(
            state.clone(),
            Arc::clone(&transport),
            frames,
        )));
        match output {
            Some(output) => tasks.push(tokio::spawn(receiver::message_receiver(
                state.clone(),
                options.notification_handler,
                output,
                LineCodec::with_max_frame_bytes(options.max_frame_bytes),
            ))),
            None => state.shutdown("transport has no output stream"),
        }
        if let Some(diagnostics) = diagnostics {
            tasks.push(tokio::spawn(receiver::diagnostics_logger(
                server_name,
                diagnostics,
            )));
        }

        Self {
            transport,
            state,
            handshake: Handshake::new(options.init_params),
            pid,
            tasks: SyncMutex::new(tasks),
        }
    }

    /// Server name this session belongs to
    pub fn server_name(&self) -> &str {
        &self.state.server_name
    }

    /// Run the initialize handshake
    #[instrument(skip(self), fields(server = %self.state.server_name), level = "debug")]
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let result = self.handshake.begin(self).await;
        if result.is_err() && self.is_closed() {
            self.handshake.fail();
        }
        result
    }

    /// Handshake progress
    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake.state()
    }

    /// Whether application requests may be sent
    pub fn is_ready(&self) -> bool {
        !self.is_closed() && self.handshake.is_ready()
    }

    /// Server info from the initialize result
    pub fn server_info(&self) -> Option<McpServerInfo> {
        self.handshake.result().map(|result| result.server_info)
    }

    /// Worker process id, if process-backed
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Send an application request using the default deadline
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let timeout = self.state.correlator.default_timeout();
        self.request_with_timeout(method, params, timeout).await
    }

    /// Send an application request with an explicit deadline
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        self.ensure_ready()?;
        self.call_unchecked(method, params, timeout).await
    }

    /// Send an application notification
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.ensure_ready()?;
        self.notify_unchecked(method, params).await
    }

    /// Liveness probe.
    ///
    /// Any response proves the worker is alive, including a JSON-RPC error
    /// from a server that does not implement `ping`.
    pub async fn ping(&self, timeout: Duration) -> Result<(), McpError> {
        match self.request_with_timeout(methods::PING, None, timeout).await {
            Ok(_) | Err(McpError::Protocol { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Tear the session down: fail pending requests, then stop the worker.
    /// Idempotent.
    ///
    /// Closing the session first makes the writer abandon any blocked write
    /// and release the transport.
    pub async fn close(&self, reason: &str) -> Result<(), McpError> {
        self.state.shutdown(reason);
        self.handshake.fail();

        let result = self.transport.lock().await.kill().await;

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        result
    }

    /// Resolves once the session has closed, for whatever reason
    pub async fn closed(&self) {
        self.state.closed.cancelled().await
    }

    /// Whether the session has closed
    pub fn is_closed(&self) -> bool {
        self.state.closed.is_cancelled()
    }

    /// Why the session closed, if it has
    pub fn close_reason(&self) -> Option<String> {
        self.state.close_reason.lock().clone()
    }

    /// Whether the worker is still running and the session open.
    ///
    /// While a frame is being written the transport is busy; the worker then
    /// counts as alive and a request deadline has to decide.
    pub fn is_alive(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.transport.try_lock() {
            Ok(mut transport) => transport.is_alive(),
            Err(_) => true,
        }
    }

    /// Requests awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.state.correlator.pending_count()
    }

    fn ensure_ready(&self) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(self.state.closed_error());
        }
        self.handshake.ensure_ready(&self.state.server_name)
    }

    /// Send a request without the readiness gate
    async fn call_unchecked(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        if self.is_closed() {
            return Err(self.state.closed_error());
        }

        let id = self.state.correlator.allocate_id();
        let pending = self
            .state
            .correlator
            .register(id.clone(), method, timeout)?;

        // Closed between the first check and registration; the teardown
        // drained the table before this entry existed.
        if self.is_closed() {
            return Err(self.state.closed_error());
        }

        let mut request = McpRequest::new(id.clone(), method);
        if let Some(params) = params {
            request = request.with_params(params);
        }
        let bytes = LineCodec::encode(&McpMessage::Request(request))?;
        self.state.enqueue(bytes)?;
        debug!(server = %self.state.server_name, request_id = %id, method, "queued request");

        let outcome = pending.wait().await;
        if let Err(McpError::Timeout { .. }) = &outcome {
            self.send_cancelled(&id).await;
        }
        outcome
    }

    /// Send a notification without the readiness gate
    async fn notify_unchecked(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(self.state.closed_error());
        }

        let mut notification = McpNotification::new(method);
        if let Some(params) = params {
            notification = notification.with_params(params);
        }
        let bytes = LineCodec::encode(&McpMessage::Notification(notification))?;
        self.state.enqueue(bytes)
    }

    async fn send_cancelled(&self, id: &RequestId) {
        let params = json!({ "requestId": id, "reason": "request timed out" });
        if let Err(e) = self.notify_unchecked(methods::CANCELLED, Some(params)).await {
            debug!(
                server = %self.state.server_name,
                request_id = %id,
                "failed to send cancellation: {}", e
            );
        }
    }
}

#[async_trait]
impl HandshakeChannel for McpClient {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let timeout = self.state.correlator.default_timeout();
        self.call_unchecked(method, params, timeout).await
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.notify_unchecked(method, params).await
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.state.shutdown("client dropped");
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
