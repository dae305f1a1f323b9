//! Connection supervisor
//!
//! Owns one [`Connection`] record per server name and drives its lifecycle:
//! connect, health monitoring, bounded restart and disconnect.

use super::builder::{SupervisorBuilder, SupervisorOptions};
use super::connection::Connection;
use super::events::{HealthEvent, SubscriptionId};
use super::health::MonitorPlan;
use super::lifecycle::Services;
use super::types::{ConnectionState, ServerHealth};
use crate::config::{McpConfig, ServerConfig};
use crate::mcp::client::McpClient;
use crate::mcp::error::McpError;
use crate::mcp::transport::TransportFactory;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

struct Shared {
    connections: DashMap<String, Arc<Connection>>,
    services: Arc<Services>,
}

impl Shared {
    fn get(&self, name: &str) -> Option<Arc<Connection>> {
        self.connections.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn entry(&self, name: &str) -> Arc<Connection> {
        Arc::clone(
            self.connections
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Connection::new(name)))
                .value(),
        )
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        for entry in self.connections.iter() {
            entry.with(|inner| {
                if let Some(monitor) = &inner.monitor {
                    monitor.token.cancel();
                }
            });
        }
    }
}

/// Supervises named MCP server connections.
///
/// Cheap to clone; clones share the same connections.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    shared: Arc<Shared>,
}

impl ConnectionSupervisor {
    /// Create a supervisor that starts workers through `factory`
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        options: SupervisorOptions,
    ) -> Result<Self, McpError> {
        options.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                connections: DashMap::new(),
                services: Arc::new(Services::new(factory, options)),
            }),
        })
    }

    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// Active options
    pub fn options(&self) -> &SupervisorOptions {
        &self.shared.services.options
    }

    /// Connect `name` using `config`.
    ///
    /// Returns immediately when already connected. Concurrent calls for the
    /// same name share a single attempt and observe its outcome. A connect
    /// issued while a restart cycle runs cancels that cycle.
    #[instrument(skip(self, config), fields(server = %name))]
    pub async fn connect(&self, name: &str, config: ServerConfig) -> Result<(), McpError> {
        let services = &self.shared.services;
        let conn = self.shared.entry(name);

        if conn.is_connected() {
            debug!("already connected");
            return Ok(());
        }
        let seen = conn.with(|inner| inner.connects_settled);

        services.stop_monitor(&conn).await;

        let (result, owner) = {
            let _guard = conn.lifecycle.lock().await;

            let settled = conn.with(|inner| {
                (inner.connects_settled != seen)
                    .then(|| inner.last_connect.clone())
                    .flatten()
            });
            if let Some(outcome) = settled {
                (outcome, false)
            } else if conn.is_connected() {
                (Ok(()), false)
            } else {
                (self.connect_locked(&conn, &config).await, true)
            }
        };

        let auto_interval = services
            .options
            .auto_monitor
            .then_some(services.options.health_interval);
        match &result {
            Ok(()) => {
                // A concurrent caller may have stopped the owner's monitor.
                if let Some(interval) = auto_interval.filter(|_| !conn.is_monitoring()) {
                    services
                        .install_monitor(&conn, MonitorPlan::watch(interval))
                        .await;
                }
            }
            Err(e) if owner && self.restarts_after(e) => {
                debug!("scheduling restart after failed handshake");
                services
                    .install_monitor(&conn, MonitorPlan::recover(e.to_string(), auto_interval))
                    .await;
            }
            Err(_) => {}
        }

        result
    }

    /// One connect attempt; the caller holds the lifecycle lock
    async fn connect_locked(
        &self,
        conn: &Connection,
        config: &ServerConfig,
    ) -> Result<(), McpError> {
        let services = &self.shared.services;
        let result = match config.validate() {
            Ok(()) => services.establish(conn, config).await,
            Err(e) => {
                conn.with(|inner| inner.config = Some(config.clone()));
                Err(e)
            }
        };

        match &result {
            Ok(()) => {
                services.events.emit(HealthEvent::Healthy {
                    server_name: conn.name.clone(),
                });
            }
            Err(e) => {
                let state = if self.restarts_after(e) {
                    ConnectionState::Unhealthy
                } else {
                    ConnectionState::Failed
                };
                warn!("connect failed: {}", e);
                conn.record_error(state, e.to_string());
                services.events.emit(HealthEvent::Unhealthy {
                    server_name: conn.name.clone(),
                    error: e.to_string(),
                });
            }
        }

        conn.with(|inner| {
            inner.connects_settled += 1;
            inner.last_connect = Some(result.clone());
        });
        result
    }

    /// A worker that started but failed its handshake gets the restart
    /// policy; spawn and configuration errors do not.
    fn restarts_after(&self, error: &McpError) -> bool {
        matches!(error, McpError::HandshakeFailed { .. })
            && self.shared.services.options.max_restart_attempts > 0
    }

    /// Connect every enabled server of `config`, concurrently.
    ///
    /// Entries that cannot be converted are recorded as `failed`.
    pub async fn connect_all(&self, config: &McpConfig) -> Vec<(String, Result<(), McpError>)> {
        let attempts = config.enabled_servers().into_iter().map(|(name, entry)| {
            let name = name.clone();
            let converted = entry.to_server_config();
            async move {
                let result = match converted {
                    Ok(server_config) => self.connect(&name, server_config).await,
                    Err(e) => {
                        self.record_invalid(&name, &e);
                        Err(e)
                    }
                };
                (name, result)
            }
        });
        join_all(attempts).await
    }

    fn record_invalid(&self, name: &str, error: &McpError) {
        let conn = self.shared.entry(name);
        conn.record_error(ConnectionState::Failed, error.to_string());
        self.shared.services.events.emit(HealthEvent::Unhealthy {
            server_name: name.to_string(),
            error: error.to_string(),
        });
    }

    /// Disconnect `name`: stop monitoring, fail pending requests and stop
    /// the worker. The record is kept. Idempotent; unknown names are a no-op.
    #[instrument(skip(self), fields(server = %name))]
    pub async fn disconnect(&self, name: &str) -> Result<(), McpError> {
        let Some(conn) = self.shared.get(name) else {
            return Ok(());
        };
        let services = &self.shared.services;

        services.stop_monitor(&conn).await;

        let client = {
            let _guard = conn.lifecycle.lock().await;
            conn.with(|inner| {
                inner.state = ConnectionState::Disconnected;
                inner.started_at = None;
                inner.connected_at = None;
                inner.client.take()
            })
        };

        // A connect that finished while we waited may have installed one.
        services.stop_monitor(&conn).await;

        if let Some(client) = client {
            client.close("disconnected").await?;
            info!("disconnected");
        }
        Ok(())
    }

    /// Start periodic probing of `name`, replacing any existing monitor
    pub async fn start_health_monitoring(
        &self,
        name: &str,
        interval: Duration,
    ) -> Result<(), McpError> {
        if interval.is_zero() {
            return Err(McpError::invalid_config(
                "health monitoring interval must be > 0",
            ));
        }
        let conn = self
            .shared
            .get(name)
            .ok_or_else(|| McpError::unknown_server(name))?;

        let state = conn.state();
        if !state.is_monitorable() {
            return Err(McpError::not_ready(name, state));
        }

        self.shared
            .services
            .install_monitor(&conn, MonitorPlan::watch(interval))
            .await;
        Ok(())
    }

    /// Stop probing `name`. Ok when nothing was running.
    pub async fn stop_health_monitoring(&self, name: &str) -> Result<(), McpError> {
        if let Some(conn) = self.shared.get(name) {
            self.shared.services.stop_monitor(&conn).await;
        }
        Ok(())
    }

    /// Whether a monitor task is active for `name`
    pub fn is_monitoring(&self, name: &str) -> bool {
        self.shared
            .get(name)
            .is_some_and(|conn| conn.is_monitoring())
    }

    /// Health snapshot of `name`
    pub fn get_server_health(&self, name: &str) -> Option<ServerHealth> {
        self.shared.get(name).map(|conn| conn.snapshot())
    }

    /// Health snapshots of every known server, sorted by name
    pub fn get_all_server_health(&self) -> Vec<ServerHealth> {
        let mut all: Vec<ServerHealth> = self
            .connections()
            .into_iter()
            .map(|conn| conn.snapshot())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Restart attempts recorded for `name`; 0 when unknown
    pub fn get_restart_count(&self, name: &str) -> u32 {
        self.shared
            .get(name)
            .map(|conn| conn.restart_count())
            .unwrap_or(0)
    }

    /// Zero the restart counter of `name`
    pub fn reset_restart_count(&self, name: &str) {
        if let Some(conn) = self.shared.get(name) {
            conn.with(|inner| inner.restart_count = 0);
        }
    }

    /// Milliseconds since the current worker was started; 0 when unknown
    pub fn get_server_uptime(&self, name: &str) -> u64 {
        self.shared
            .get(name)
            .map(|conn| conn.uptime().as_millis() as u64)
            .unwrap_or(0)
    }

    /// Whether `name` has a ready session
    pub fn is_connected(&self, name: &str) -> bool {
        self.shared
            .get(name)
            .is_some_and(|conn| conn.is_connected())
    }

    /// Names with a ready session, sorted
    pub fn get_connected_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .connections()
            .into_iter()
            .filter(|conn| conn.is_connected())
            .map(|conn| conn.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every known server name, sorted
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Register a synchronous health event handler
    pub fn on_health_event<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&HealthEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.services.events.subscribe(handler)
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn off_health_event(&self, id: SubscriptionId) -> bool {
        self.shared.services.events.unsubscribe(id)
    }

    /// Receive health events asynchronously
    pub fn subscribe_events(&self) -> broadcast::Receiver<HealthEvent> {
        self.shared.services.events.subscribe_channel()
    }

    /// Ready session of `name`
    pub fn client(&self, name: &str) -> Result<Arc<McpClient>, McpError> {
        let conn = self
            .shared
            .get(name)
            .ok_or_else(|| McpError::unknown_server(name))?;
        conn.ready_client()
            .ok_or_else(|| McpError::not_ready(name, conn.state()))
    }

    /// Send a request to `name` with the default deadline
    pub async fn request(
        &self,
        name: &str,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        self.client(name)?.request(method, params).await
    }

    /// Send a request to `name` with an explicit deadline
    pub async fn request_with_timeout(
        &self,
        name: &str,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        self.client(name)?
            .request_with_timeout(method, params, timeout)
            .await
    }

    /// Disconnect everything, forget all records and drop every handler.
    /// Safe to call more than once.
    pub async fn cleanup(&self) {
        let names = self.server_names();
        let results = join_all(names.iter().map(|name| self.disconnect(name))).await;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                warn!(server = %name, "error during cleanup: {}", e);
            }
        }
        self.shared.connections.clear();
        self.shared.services.events.clear();
        debug!("supervisor cleaned up");
    }

    fn connections(&self) -> Vec<Arc<Connection>> {
        self.shared
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
