//! Warden CLI
//!
//! Starts the MCP servers listed in the configuration, supervises them and
//! reports their health.
//!
//! ```bash
//! warden servers                 # list configured servers
//! warden status --json           # connect everything, print a health snapshot
//! warden watch                   # stream health events until Ctrl-C
//! warden call files tools/list   # send one request to one server
//! ```

mod args;
mod commands;
mod console;
mod logging;
mod router;

use clap::Parser;
use warden_core::error::WardenResult;

pub use args::{Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() -> WardenResult<()> {
    let cli = Cli::parse();
    router::route(cli).await
}
