//! CLI console for formatted output

use chrono::{DateTime, Utc};
use colored::*;
use warden_core::mcp::{ConnectionState, HealthEvent, ServerHealth};

pub struct CliConsole {
    verbose: bool,
}

impl CliConsole {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Print an info message (verbose only)
    pub fn info(&self, message: &str) {
        if self.verbose {
            println!("{} {}", "ℹ".blue().bold(), message);
        }
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", "✓".green().bold(), message.green());
    }

    pub fn warn(&self, message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message.yellow());
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message.red());
    }

    pub fn print_header(&self, title: &str) {
        println!();
        println!("{}", title.bold().underline());
        println!("{}", "=".repeat(title.len()).dimmed());
    }

    pub fn print_health(&self, health: &ServerHealth) {
        println!("{}", health_line(health));
        if let Some(error) = &health.last_error {
            println!("    {} {}", "last error:".dimmed(), error);
        }
    }

    pub fn print_event(&self, at: DateTime<Utc>, event: &HealthEvent) {
        let stamp = at.format("%H:%M:%S%.3f").to_string();
        let tag = match event {
            HealthEvent::Healthy { .. } | HealthEvent::Restarted { .. } => event.kind().green(),
            HealthEvent::Unhealthy { .. } | HealthEvent::Restarting { .. } => {
                event.kind().yellow()
            }
            HealthEvent::RestartFailed { .. } => event.kind().red(),
        };
        println!("{} {:<15} {}", stamp.dimmed(), tag, event);
    }
}

fn paint_state(state: ConnectionState) -> ColoredString {
    let label = state.to_string();
    match state {
        ConnectionState::Ready => label.green(),
        ConnectionState::Unhealthy | ConnectionState::Restarting => label.yellow(),
        ConnectionState::Failed => label.red(),
        _ => label.dimmed(),
    }
}

/// One table row for a server snapshot
pub fn health_line(health: &ServerHealth) -> String {
    let pid = health
        .pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "  {:<20} {:<12} pid {:<8} up {:<10} restarts {}",
        health.name,
        paint_state(health.state),
        pid,
        format_uptime(health.uptime_ms),
        health.restart_count
    )
}

/// Compact human form of a millisecond duration
pub fn format_uptime(ms: u64) -> String {
    let secs = ms / 1000;
    match secs {
        0 => format!("{}ms", ms),
        1..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m{}s", secs / 60, secs % 60),
        _ => format!("{}h{}m", secs / 3600, (secs % 3600) / 60),
    }
}
