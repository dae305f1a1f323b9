//! CLI commands

pub mod call;
pub mod config;
pub mod servers;
pub mod status;
pub mod watch;

use tracing::debug;
use warden_core::config::WardenConfig;
use warden_core::error::WardenResult;
use warden_core::mcp::{ConnectionSupervisor, SupervisorBuilder};

/// Supervisor configured from `config`, with probes only where asked for
pub(crate) fn supervisor_for(
    config: &WardenConfig,
    monitor: bool,
) -> WardenResult<ConnectionSupervisor> {
    let supervisor = SupervisorBuilder::from_config(&config.mcp)
        .with_auto_monitor(monitor && config.mcp.health.enabled)
        .build()?;
    debug!(options = ?supervisor.options(), "supervisor created");
    Ok(supervisor)
}
