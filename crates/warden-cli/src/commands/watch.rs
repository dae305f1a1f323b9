//! `warden watch`

use crate::console::CliConsole;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use warden_core::config::WardenConfig;
use warden_core::error::WardenResult;
use warden_core::mcp::SupervisorBuilder;

/// Supervise every enabled server and print health events as they happen.
///
/// Runs until Ctrl-C, or for `duration_ms` when given.
pub async fn watch(
    config: &WardenConfig,
    interval_ms: Option<u64>,
    duration_ms: Option<u64>,
    console: &CliConsole,
) -> WardenResult<()> {
    let mut builder = SupervisorBuilder::from_config(&config.mcp).with_auto_monitor(true);
    if let Some(interval_ms) = interval_ms {
        builder = builder.with_health_interval(Duration::from_millis(interval_ms.max(1)));
    }
    let supervisor = builder.build()?;
    debug!(options = ?supervisor.options(), "supervisor created");
    let mut events = supervisor.subscribe_events();

    let results = supervisor.connect_all(&config.mcp).await;
    if results.is_empty() {
        console.warn("No enabled MCP servers configured.");
        return Ok(());
    }
    for (name, result) in &results {
        match result {
            Ok(()) => console.info(&format!("{} connected", name)),
            Err(e) => console.error(&format!("{}: {}", name, e)),
        }
    }

    let deadline = async {
        match duration_ms {
            Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                console.info("interrupted");
                break;
            }
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Ok(event) => console.print_event(Utc::now(), &event),
                Err(RecvError::Lagged(skipped)) => {
                    console.warn(&format!("skipped {} health events", skipped));
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("stopping supervised servers");
    console.print_header("Final Status");
    for snapshot in supervisor.get_all_server_health() {
        console.print_health(&snapshot);
    }
    supervisor.cleanup().await;
    Ok(())
}
