//! Per-connection record

use super::types::{ConnectionState, ServerHealth};
use crate::config::ServerConfig;
use crate::mcp::client::McpClient;
use crate::mcp::error::McpError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Health monitor task owned by a connection
pub(super) struct MonitorHandle {
    pub(super) id: u64,
    pub(super) token: CancellationToken,
    pub(super) handle: JoinHandle<()>,
}

impl MonitorHandle {
    fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

/// Mutable part of a connection, guarded by a short-lived lock
pub(super) struct ConnectionInner {
    pub(super) state: ConnectionState,
    pub(super) config: Option<ServerConfig>,
    pub(super) client: Option<Arc<McpClient>>,
    pub(super) started_at: Option<Instant>,
    pub(super) connected_at: Option<DateTime<Utc>>,
    pub(super) restart_count: u32,
    pub(super) last_error: Option<String>,
    pub(super) monitor: Option<MonitorHandle>,
    /// Bumped every time an external connect settles
    pub(super) connects_settled: u64,
    pub(super) last_connect: Option<Result<(), McpError>>,
}

/// One named server under supervision.
///
/// `lifecycle` serializes connect, restart attempts and disconnect.
/// `monitor_lock` serializes installing and stopping the health monitor.
pub(super) struct Connection {
    pub(super) name: String,
    pub(super) lifecycle: tokio::sync::Mutex<()>,
    pub(super) monitor_lock: tokio::sync::Mutex<()>,
    inner: Mutex<ConnectionInner>,
}

impl Connection {
    pub(super) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lifecycle: tokio::sync::Mutex::new(()),
            monitor_lock: tokio::sync::Mutex::new(()),
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Disconnected,
                config: None,
                client: None,
                started_at: None,
                connected_at: None,
                restart_count: 0,
                last_error: None,
                monitor: None,
                connects_settled: 0,
                last_connect: None,
            }),
        }
    }

    /// Run `f` with the record locked. Never hold across an await.
    pub(super) fn with<R>(&self, f: impl FnOnce(&mut ConnectionInner) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// State as observed by callers.
    ///
    /// A `ready` record whose session already closed reports `unhealthy`
    /// until the monitor (if any) reacts.
    pub(super) fn state(&self) -> ConnectionState {
        let inner = self.inner.lock();
        match (&inner.state, &inner.client) {
            (ConnectionState::Ready, Some(client)) if !client.is_ready() => {
                ConnectionState::Unhealthy
            }
            (state, _) => *state,
        }
    }

    pub(super) fn record_error(&self, state: ConnectionState, error: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.state = state;
        inner.last_error = Some(error.into());
    }

    /// Ready session, if any
    pub(super) fn ready_client(&self) -> Option<Arc<McpClient>> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.client) {
            (ConnectionState::Ready, Some(client)) if client.is_ready() => Some(Arc::clone(client)),
            _ => None,
        }
    }

    /// Current session, ready or not
    pub(super) fn client(&self) -> Option<Arc<McpClient>> {
        self.inner.lock().client.clone()
    }

    pub(super) fn is_connected(&self) -> bool {
        self.ready_client().is_some()
    }

    pub(super) fn restart_count(&self) -> u32 {
        self.inner.lock().restart_count
    }

    pub(super) fn uptime(&self) -> Duration {
        self.inner
            .lock()
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    pub(super) fn is_monitoring(&self) -> bool {
        self.inner
            .lock()
            .monitor
            .as_ref()
            .is_some_and(MonitorHandle::is_active)
    }

    /// Drop the monitor entry if it is still monitor `id`
    pub(super) fn release_monitor(&self, id: u64) {
        let mut inner = self.inner.lock();
        if inner.monitor.as_ref().is_some_and(|monitor| monitor.id == id) {
            inner.monitor = None;
        }
    }

    pub(super) fn snapshot(&self) -> ServerHealth {
        let state = self.state();
        let inner = self.inner.lock();
        let client = inner.client.as_ref();

        ServerHealth {
            name: self.name.clone(),
            state,
            restart_count: inner.restart_count,
            uptime_ms: inner
                .started_at
                .map(|started| started.elapsed().as_millis() as u64)
                .unwrap_or(0),
            last_error: inner.last_error.clone(),
            pid: client.and_then(|c| c.pid()),
            connected_at: inner.connected_at,
            pending_requests: client.map(|c| c.pending_requests()).unwrap_or(0),
            monitoring: inner.monitor.as_ref().is_some_and(MonitorHandle::is_active),
        }
    }
}
