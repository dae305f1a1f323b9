//! Session establishment and monitor ownership

use super::builder::SupervisorOptions;
use super::connection::{Connection, MonitorHandle};
use super::events::HealthEventBus;
use super::health::{MonitorPlan, run_monitor};
use super::types::ConnectionState;
use crate::config::ServerConfig;
use crate::mcp::client::{ClientOptions, McpClient};
use crate::mcp::error::McpError;
use crate::mcp::transport::TransportFactory;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything a connection needs to (re)build itself, shared with monitor
/// tasks.
pub(super) struct Services {
    pub(super) factory: Arc<dyn TransportFactory>,
    pub(super) events: HealthEventBus,
    pub(super) options: SupervisorOptions,
    next_monitor_id: AtomicU64,
}

impl Services {
    pub(super) fn new(factory: Arc<dyn TransportFactory>, options: SupervisorOptions) -> Self {
        Self {
            factory,
            events: HealthEventBus::new(),
            options,
            next_monitor_id: AtomicU64::new(1),
        }
    }

    fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: self.options.request_timeout,
            init_params: self.options.init_params.clone(),
            notification_handler: Arc::clone(&self.options.notification_handler),
            ..ClientOptions::default()
        }
    }

    /// Replace the session of `conn` with a fresh worker and run the
    /// handshake. The caller must hold `conn.lifecycle`.
    ///
    /// On success the connection is `ready`. On failure the state is left
    /// for the caller to decide; the failed worker is already gone.
    pub(super) async fn establish(
        &self,
        conn: &Connection,
        config: &ServerConfig,
    ) -> Result<(), McpError> {
        let previous = conn.with(|inner| {
            inner.config = Some(config.clone());
            inner.state = ConnectionState::Connecting;
            inner.connected_at = None;
            inner.started_at = None;
            inner.client.take()
        });
        if let Some(previous) = previous {
            if let Err(e) = previous.close("replaced by a new session").await {
                debug!(server = %conn.name, "failed to stop previous worker: {}", e);
            }
        }

        let transport = self.factory.open(&conn.name, config).await?;
        let client = Arc::new(McpClient::new(
            conn.name.clone(),
            transport,
            self.client_options(),
        ));

        conn.with(|inner| {
            inner.started_at = Some(Instant::now());
            inner.state = ConnectionState::Handshaking;
            inner.client = Some(Arc::clone(&client));
        });

        match client.initialize().await {
            Ok(result) => {
                conn.with(|inner| {
                    inner.state = ConnectionState::Ready;
                    inner.connected_at = Some(Utc::now());
                });
                info!(
                    server = %conn.name,
                    remote = %result.server_info.name,
                    version = %result.server_info.version,
                    pid = ?client.pid(),
                    "MCP server ready"
                );
                Ok(())
            }
            Err(e) => {
                conn.with(|inner| {
                    inner.client = None;
                    inner.started_at = None;
                });
                if let Err(close_err) = client.close("handshake failed").await {
                    debug!(server = %conn.name, "failed to stop worker: {}", close_err);
                }
                Err(e)
            }
        }
    }

    /// `establish` under the lifecycle lock
    pub(super) async fn establish_locked(
        &self,
        conn: &Connection,
        config: &ServerConfig,
    ) -> Result<(), McpError> {
        let _guard = conn.lifecycle.lock().await;
        self.establish(conn, config).await
    }

    /// Start a monitor for `conn`, replacing (and awaiting) any previous one
    pub(super) async fn install_monitor(
        self: &Arc<Self>,
        conn: &Arc<Connection>,
        plan: MonitorPlan,
    ) {
        let _guard = conn.monitor_lock.lock().await;
        Self::cancel_monitor(conn).await;

        let id = self.next_monitor_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_monitor(
            Arc::clone(self),
            Arc::clone(conn),
            token.clone(),
            id,
            plan,
        ));

        conn.with(|inner| inner.monitor = Some(MonitorHandle { id, token, handle }));
    }

    /// Stop the monitor of `conn`, if any, and wait for it to exit
    pub(super) async fn stop_monitor(&self, conn: &Connection) {
        let _guard = conn.monitor_lock.lock().await;
        Self::cancel_monitor(conn).await;
    }

    async fn cancel_monitor(conn: &Connection) {
        let Some(monitor) = conn.with(|inner| inner.monitor.take()) else {
            return;
        };
        monitor.token.cancel();
        if let Err(e) = monitor.handle.await {
            if e.is_panic() {
                tracing::error!(server = %conn.name, "health monitor panicked");
            }
        }
        debug!(server = %conn.name, "health monitoring stopped");
    }
}
