//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConfigAction};
use crate::commands;
use crate::console::CliConsole;
use crate::logging;
use tracing::debug;
use warden_core::config::{LoggingConfig, load_config};
use warden_core::error::WardenResult;

/// Load configuration, set up logging and run the selected command
pub async fn route(cli: Cli) -> WardenResult<()> {
    let config = match load_config(cli.config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            logging::init(&LoggingConfig::default(), cli.verbose);
            return Err(e);
        }
    };
    logging::init(&config.logging, cli.verbose);
    debug!(
        config_file = ?cli.config_file,
        servers = config.mcp.servers.len(),
        "configuration loaded"
    );

    let console = CliConsole::new(cli.verbose);
    match cli.command {
        Commands::Servers { format } => commands::servers::list_servers(&config, format),
        Commands::Status { json } => commands::status::status(&config, json, &console).await,
        Commands::Watch {
            interval_ms,
            duration_ms,
        } => commands::watch::watch(&config, interval_ms, duration_ms, &console).await,
        Commands::Call {
            server,
            method,
            params,
            timeout_ms,
        } => {
            commands::call::call(
                &config,
                commands::call::CallArgs {
                    server,
                    method,
                    params,
                    timeout_ms,
                },
            )
            .await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&config),
            ConfigAction::Validate => commands::config::validate(&config, &console),
        },
    }
}
