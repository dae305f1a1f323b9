//! `warden config`

use crate::console::CliConsole;
use warden_core::config::WardenConfig;
use warden_core::error::WardenResult;

/// Print the effective configuration
pub fn show(config: &WardenConfig) -> WardenResult<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

/// Configuration was already validated while loading; resolve every server
/// entry as well so transport problems show up here.
pub fn validate(config: &WardenConfig, console: &CliConsole) -> WardenResult<()> {
    let mut names: Vec<&String> = config.mcp.servers.keys().collect();
    names.sort();

    for name in names {
        config.mcp.servers[name].to_server_config()?;
    }

    console.success(&format!(
        "Configuration is valid ({} server(s))",
        config.mcp.servers.len()
    ));
    Ok(())
}
