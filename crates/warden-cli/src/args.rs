//! CLI argument definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(about = "Warden - supervisor for MCP tool servers")]
#[command(
    long_about = r#"Warden - supervisor for MCP tool servers

USAGE:
  warden servers                     # List configured servers
  warden status [--json]             # Connect and print health
  warden watch                       # Stream health events
  warden call <server> <method>      # Send a single request
  warden config show                 # Show the effective configuration

Configuration is read from ~/.warden/config.json unless --config-file is
given. RUST_LOG overrides the configured log level."#
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (json, toml or yaml)
    #[arg(long, global = true, env = "WARDEN_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Enable verbose output, including worker stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured servers without starting them
    Servers {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Connect every enabled server and print a health snapshot
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Connect every enabled server and print health events until interrupted
    Watch {
        /// Override the health probe interval
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Stop after this many milliseconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_ms: Option<u64>,
    },

    /// Send one request to one server and print the result
    Call {
        /// Server name from the configuration
        server: String,

        /// JSON-RPC method
        method: String,

        /// Params as a JSON value
        #[arg(long)]
        params: Option<String>,

        /// Request deadline
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON
    Show,

    /// Load and validate the configuration
    Validate,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
