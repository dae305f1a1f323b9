//! In-memory MCP server and transport factory for tests

use super::error::McpError;
use super::protocol::MCP_PROTOCOL_VERSION;
use super::transport::{McpTransport, StreamTransport, TransportFactory};
use crate::config::ServerConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How the fake server answers `initialize`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitBehavior {
    Respond,
    Reject,
    Silent,
}

/// How the fake server answers `ping`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PingBehavior {
    Respond,
    MethodNotFound,
    Silent,
}

/// Script for one fake server instance
#[derive(Debug, Clone, Copy)]
pub(crate) struct FakeBehavior {
    pub(crate) initialize: InitBehavior,
    pub(crate) ping: PingBehavior,
    /// Close the output stream right after the handshake completes
    pub(crate) exit_after_handshake: bool,
    /// Stop reading input after the handshake while staying alive
    pub(crate) stall_after_handshake: bool,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            initialize: InitBehavior::Respond,
            ping: PingBehavior::Respond,
            exit_after_handshake: false,
            stall_after_handshake: false,
        }
    }
}

impl FakeBehavior {
    pub(crate) fn rejecting_initialize() -> Self {
        Self {
            initialize: InitBehavior::Reject,
            ..Self::default()
        }
    }

    pub(crate) fn silent_initialize() -> Self {
        Self {
            initialize: InitBehavior::Silent,
            ..Self::default()
        }
    }

    pub(crate) fn hung() -> Self {
        Self {
            ping: PingBehavior::Silent,
            ..Self::default()
        }
    }

    pub(crate) fn stalled() -> Self {
        Self {
            stall_after_handshake: true,
            ..Self::default()
        }
    }
}

/// Control handle for a running fake server
#[derive(Clone)]
pub(crate) struct FakeServerHandle {
    crash: CancellationToken,
    received: Arc<Mutex<Vec<Value>>>,
    push: mpsc::UnboundedSender<String>,
}

impl FakeServerHandle {
    /// Close both streams as if the worker died
    pub(crate) fn crash(&self) {
        self.crash.cancel();
    }

    /// Every frame the server received, in order
    pub(crate) fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Methods of every frame received, in order
    pub(crate) fn received_methods(&self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|frame| frame["method"].as_str().map(str::to_string))
            .collect()
    }

    /// Write a raw line to the client
    pub(crate) fn push_line(&self, line: impl Into<String>) {
        let _ = self.push.send(line.into());
    }
}

/// Start a fake server and return the client-side transport
pub(crate) fn spawn_fake_server(behavior: FakeBehavior) -> (StreamTransport, FakeServerHandle) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_io);
    let (server_read, mut server_write) = tokio::io::split(server_io);

    let crash = CancellationToken::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    let handle = FakeServerHandle {
        crash: crash.clone(),
        received: Arc::clone(&received),
        push: push_tx,
    };

    let exit = CancellationToken::new();
    let reader_exit = exit.clone();
    let reader_crash = crash.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(server_read).lines();
        loop {
            let line = tokio::select! {
                _ = reader_crash.cancelled() => break,
                _ = reader_exit.cancelled() => break,
                line = lines.next_line() => line,
            };
            let Ok(Some(line)) = line else { break };
            let Ok(frame) = serde_json::from_str::<Value>(&line) else {
                continue;
            };
            received.lock().push(frame.clone());
            let initialized = frame["method"] == "notifications/initialized";
            handle_frame(frame, behavior, &reply_tx, &reader_exit);

            if initialized && behavior.stall_after_handshake {
                // Keep the pipe open but never drain it again.
                tokio::select! {
                    _ = reader_crash.cancelled() => {}
                    _ = reader_exit.cancelled() => {}
                }
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            let line = tokio::select! {
                _ = crash.cancelled() => break,
                _ = exit.cancelled() => break,
                Some(line) = reply_rx.recv() => line,
                Some(line) = push_rx.recv() => line,
                else => break,
            };
            if server_write.write_all(line.as_bytes()).await.is_err()
                || server_write.write_all(b"\n").await.is_err()
            {
                break;
            }
        }
        let _ = server_write.shutdown().await;
    });

    (StreamTransport::new(client_read, client_write), handle)
}

fn handle_frame(
    frame: Value,
    behavior: FakeBehavior,
    replies: &mpsc::UnboundedSender<String>,
    exit: &CancellationToken,
) {
    let method = frame["method"].as_str().unwrap_or_default().to_string();
    let id = frame.get("id").cloned().filter(|id| !id.is_null());
    let params = frame.get("params").cloned().unwrap_or(Value::Null);

    let Some(id) = id else {
        if method == "notifications/initialized" && behavior.exit_after_handshake {
            exit.cancel();
        }
        return;
    };

    let send = |payload: Value| {
        let _ = replies.send(payload.to_string());
    };
    let result = |value: Value| json!({"jsonrpc": "2.0", "id": id, "result": value});
    let error = |code: i64, message: &str| {
        json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
    };

    match method.as_str() {
        "initialize" => match behavior.initialize {
            InitBehavior::Respond => send(result(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {"tools": {"listChanged": false}},
                "serverInfo": {"name": "fake", "version": "0.0.1"}
            }))),
            InitBehavior::Reject => send(error(-32603, "initialize rejected")),
            InitBehavior::Silent => {}
        },
        "ping" => match behavior.ping {
            PingBehavior::Respond => send(result(json!({}))),
            PingBehavior::MethodNotFound => send(error(-32601, "Method not found")),
            PingBehavior::Silent => {}
        },
        "echo" => send(result(params)),
        "fail" => send(error(-32000, "requested failure")),
        "never" => {}
        "slow" => {
            let delay = params["ms"].as_u64().unwrap_or(100);
            let reply = result(json!({"slept_ms": delay})).to_string();
            let replies = replies.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let _ = replies.send(reply);
            });
        }
        "notify_then_echo" => {
            send(json!({"jsonrpc": "2.0", "method": "notifications/message", "params": params}));
            send(result(params));
        }
        _ => send(error(-32601, "Method not found")),
    }
}

/// Transport factory backed by fake servers, counting every spawn
#[derive(Default)]
pub(crate) struct FakeFactory {
    spawns: AtomicUsize,
    default_behavior: Mutex<FakeBehavior>,
    scripted: Mutex<VecDeque<Result<FakeBehavior, McpError>>>,
    servers: Mutex<Vec<FakeServerHandle>>,
    open_delay: Mutex<Duration>,
}

impl FakeFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Behavior used once the script runs out
    pub(crate) fn set_default(&self, behavior: FakeBehavior) {
        *self.default_behavior.lock() = behavior;
    }

    /// Queue the outcome of the next `open`
    pub(crate) fn push(&self, outcome: Result<FakeBehavior, McpError>) {
        self.scripted.lock().push_back(outcome);
    }

    /// Delay every `open` to widen race windows
    pub(crate) fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = delay;
    }

    /// Number of `open` calls so far
    pub(crate) fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    /// Handle of the most recently started server
    pub(crate) fn latest(&self) -> Option<FakeServerHandle> {
        self.servers.lock().last().cloned()
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn open(
        &self,
        _name: &str,
        _config: &ServerConfig,
    ) -> Result<Box<dyn McpTransport>, McpError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);

        let delay = *self.open_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.scripted.lock().pop_front();
        let behavior = match next {
            Some(outcome) => outcome?,
            None => *self.default_behavior.lock(),
        };

        let (transport, handle) = spawn_fake_server(behavior);
        self.servers.lock().push(handle);
        Ok(Box::new(transport))
    }
}
