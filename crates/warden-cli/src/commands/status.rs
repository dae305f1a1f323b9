//! `warden status`

use super::supervisor_for;
use crate::console::CliConsole;
use tracing::debug;
use warden_core::config::WardenConfig;
use warden_core::error::WardenResult;

/// Connect every enabled server, print one snapshot, shut everything down
pub async fn status(config: &WardenConfig, json: bool, console: &CliConsole) -> WardenResult<()> {
    let supervisor = supervisor_for(config, false)?;
    let results = supervisor.connect_all(&config.mcp).await;
    let health = supervisor.get_all_server_health();
    supervisor.cleanup().await;
    debug!(servers = health.len(), "status snapshot taken");

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    if results.is_empty() {
        console.warn("No enabled MCP servers configured.");
        return Ok(());
    }

    console.print_header("MCP Server Status");
    for snapshot in &health {
        console.print_health(snapshot);
    }

    let failed = results.iter().filter(|(_, result)| result.is_err()).count();
    println!();
    if failed == 0 {
        console.success(&format!("{} server(s) ready", results.len()));
    } else {
        console.warn(&format!(
            "{} of {} server(s) failed to connect",
            failed,
            results.len()
        ));
    }
    Ok(())
}
