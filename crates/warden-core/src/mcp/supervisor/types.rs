//! Connection state and health snapshot types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of one supervised connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No worker; initial state and the state after `disconnect`
    Disconnected,
    /// Worker being spawned
    Connecting,
    /// Worker running, initialize exchange in flight
    Handshaking,
    /// Handshake complete, requests allowed
    Ready,
    /// Health check failed, restart pending
    Unhealthy,
    /// Restart attempt in progress or backing off
    Restarting,
    /// Gave up; needs an explicit `connect`
    Failed,
}

impl ConnectionState {
    /// Whether a health timer may run in this state
    pub fn is_monitorable(self) -> bool {
        matches!(self, Self::Ready | Self::Unhealthy)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Unhealthy => "unhealthy",
            Self::Restarting => "restarting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Read-only snapshot of one connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerHealth {
    /// Server name
    pub name: String,
    /// Current state
    pub state: ConnectionState,
    /// Restart attempts since the last reset
    pub restart_count: u32,
    /// Time since the current worker was spawned, 0 if none
    pub uptime_ms: u64,
    /// Most recent failure, kept after recovery for inspection
    pub last_error: Option<String>,
    /// Worker process id
    pub pid: Option<u32>,
    /// When the current session became ready
    pub connected_at: Option<DateTime<Utc>>,
    /// Requests awaiting a response
    pub pending_requests: usize,
    /// Whether a health timer is active
    pub monitoring: bool,
}
