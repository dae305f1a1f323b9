//! `warden servers`

use crate::args::OutputFormat;
use colored::*;
use std::collections::BTreeMap;
use warden_core::config::WardenConfig;
use warden_core::error::WardenResult;

/// List configured servers without starting any of them
pub fn list_servers(config: &WardenConfig, format: OutputFormat) -> WardenResult<()> {
    let servers: BTreeMap<_, _> = config.mcp.servers.iter().collect();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&servers)?);
        return Ok(());
    }

    if servers.is_empty() {
        println!("No MCP servers configured.");
        println!("\nAdd entries under \"mcp.servers\" in ~/.warden/config.json");
        return Ok(());
    }

    println!("Configured MCP Servers:\n");
    for (name, server) in servers {
        let status = if server.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        match server.to_server_config() {
            Ok(resolved) => {
                let transport = if resolved.is_local() { "stdio" } else { "remote" };
                println!("  {} ({}) - {} [{}]", name.bold(), transport, resolved, status);
            }
            Err(e) => println!("  {} - {} [{}]", name.bold(), e.to_string().red(), status),
        }
    }
    Ok(())
}
