//! Health monitoring and bounded restart

use super::connection::Connection;
use super::events::HealthEvent;
use super::lifecycle::Services;
use super::types::ConnectionState;
use crate::mcp::client::McpClient;
use crate::mcp::error::McpError;
use crate::recovery::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// What a monitor task does
#[derive(Debug, Clone)]
pub(super) struct MonitorPlan {
    /// Probe period; `None` means exit once no recovery is needed
    pub(super) interval: Option<Duration>,
    /// Run a restart cycle first, for this failure
    pub(super) recover_from: Option<String>,
}

impl MonitorPlan {
    /// Periodic probing of a ready connection
    pub(super) fn watch(interval: Duration) -> Self {
        Self {
            interval: Some(interval),
            recover_from: None,
        }
    }

    /// Restart cycle for a failed connect, then optional probing
    pub(super) fn recover(error: impl Into<String>, interval: Option<Duration>) -> Self {
        Self {
            interval,
            recover_from: Some(error.into()),
        }
    }
}

/// Body of the single monitor task of one connection.
///
/// Owns the whole unhealthy/restart cycle, so events of one cycle are never
/// interleaved with another.
pub(super) async fn run_monitor(
    services: Arc<Services>,
    conn: Arc<Connection>,
    token: CancellationToken,
    id: u64,
    plan: MonitorPlan,
) {
    if let Some(error) = plan.recover_from {
        if !recover(&services, &conn, &token, id, error).await {
            return;
        }
    }

    let Some(interval) = plan.interval else {
        conn.release_monitor(id);
        return;
    };
    debug!(
        server = %conn.name,
        interval_ms = interval.as_millis() as u64,
        "health monitoring started"
    );

    loop {
        let Some(client) = conn.client() else {
            conn.release_monitor(id);
            return;
        };

        let failure = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            failure = watch_session(&services, &client, &token, interval) => match failure {
                Some(failure) => failure,
                None => return,
            },
        };

        warn!(server = %conn.name, "health check failed: {}", failure);
        conn.record_error(ConnectionState::Unhealthy, failure.clone());
        services.events.emit(HealthEvent::Unhealthy {
            server_name: conn.name.clone(),
            error: failure.clone(),
        });

        // Fails every request still waiting on the old worker.
        if let Err(e) = client.close("health check failed").await {
            debug!(server = %conn.name, "failed to stop unhealthy worker: {}", e);
        }
        drop(client);

        if !recover(&services, &conn, &token, id, failure).await {
            return;
        }
    }
}

/// Probe `client` every `interval` until it fails or closes.
///
/// Returns the failure, or `None` when cancelled.
async fn watch_session(
    services: &Services,
    client: &McpClient,
    token: &CancellationToken,
    interval: Duration,
) -> Option<String> {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let probe_timeout = services.options.probe_timeout;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            _ = client.closed() => {
                return Some(client.close_reason().unwrap_or_else(|| "server exited".to_string()));
            }
            _ = ticker.tick() => {
                match probe(client, probe_timeout).await {
                    Ok(()) => trace!(server = %client.server_name(), "health probe ok"),
                    Err(e) => return Some(e.to_string()),
                }
            }
        }
    }
}

/// Liveness probe: process check first, then `ping`
async fn probe(client: &McpClient, timeout: Duration) -> Result<(), McpError> {
    if !client.is_alive() {
        return Err(McpError::connection_closed("process is not running"));
    }
    client.ping(timeout).await
}

/// Restart with backoff until success or the attempt limit.
///
/// Returns `true` when the connection is ready again.
async fn recover(
    services: &Services,
    conn: &Connection,
    token: &CancellationToken,
    id: u64,
    mut last_error: String,
) -> bool {
    let max_attempts = services.options.max_restart_attempts;
    let mut backoff = ExponentialBackoff::with_config(services.options.backoff.clone());

    let Some(config) = conn.with(|inner| inner.config.clone()) else {
        conn.release_monitor(id);
        return false;
    };

    for attempt in 1..=max_attempts {
        if token.is_cancelled() {
            return false;
        }

        conn.with(|inner| {
            inner.state = ConnectionState::Restarting;
            inner.restart_count = inner.restart_count.saturating_add(1);
        });
        services.events.emit(HealthEvent::Restarting {
            server_name: conn.name.clone(),
            attempt,
        });

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            outcome = services.establish_locked(conn, &config) => outcome,
        };

        match outcome {
            Ok(()) => {
                info!(server = %conn.name, attempt, "MCP server restarted");
                services.events.emit(HealthEvent::Restarted {
                    server_name: conn.name.clone(),
                    attempt,
                });
                return true;
            }
            Err(e) => {
                warn!(server = %conn.name, attempt, "restart attempt failed: {}", e);
                last_error = e.to_string();
                conn.record_error(ConnectionState::Restarting, last_error.clone());
            }
        }

        if attempt < max_attempts {
            let delay = backoff.next_delay();
            debug!(
                server = %conn.name,
                delay_ms = delay.as_millis() as u64,
                "backing off before next restart"
            );
            tokio::select! {
                biased;
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    let exhausted = McpError::RestartExhausted {
        attempts: max_attempts,
        last_error: last_error.clone(),
    };
    conn.with(|inner| {
        inner.state = ConnectionState::Failed;
        inner.last_error = Some(exhausted.to_string());
        inner.started_at = None;
    });
    conn.release_monitor(id);
    services.events.emit(HealthEvent::RestartFailed {
        server_name: conn.name.clone(),
        error: last_error,
        attempts: max_attempts,
    });
    false
}
