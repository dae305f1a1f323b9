//! MCP (Model Context Protocol) configuration

use super::server_config::ServerConfig;
use crate::mcp::error::McpError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_health_interval_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_max_restart_attempts() -> u32 {
    3
}

fn default_restart_initial_delay_ms() -> u64 {
    1_000
}

fn default_restart_max_delay_ms() -> u64 {
    30_000
}

fn default_restart_backoff_multiplier() -> f64 {
    2.0
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

fn default_true() -> bool {
    true
}

/// MCP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// MCP servers by name
    #[serde(default, alias = "mcpServers")]
    pub servers: HashMap<String, McpServerConfig>,
    /// Per-request deadline in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Health monitoring and restart policy
    #[serde(default)]
    pub health: HealthConfig,
    /// How long a worker gets to exit after SIGTERM before it is killed
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            servers: HashMap::new(),
            request_timeout_ms: default_request_timeout_ms(),
            health: HealthConfig::default(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Health check and auto-restart settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Start monitoring automatically after a successful connect
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Probe interval in milliseconds
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
    /// Deadline for a single liveness probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Restart attempts before giving up
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,
    /// Delay before the second attempt
    #[serde(default = "default_restart_initial_delay_ms")]
    pub restart_initial_delay_ms: u64,
    /// Upper bound for the delay between attempts
    #[serde(default = "default_restart_max_delay_ms")]
    pub restart_max_delay_ms: u64,
    /// Growth factor between consecutive delays
    #[serde(default = "default_restart_backoff_multiplier")]
    pub restart_backoff_multiplier: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_health_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_restart_attempts: default_max_restart_attempts(),
            restart_initial_delay_ms: default_restart_initial_delay_ms(),
            restart_max_delay_ms: default_restart_max_delay_ms(),
            restart_backoff_multiplier: default_restart_backoff_multiplier(),
        }
    }
}

/// On-disk shape of one server entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Transport type: "stdio", "http", "sse" or "websocket"; inferred when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    /// Command to execute (for stdio transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Command arguments (for stdio transport)
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables (for stdio transport)
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Endpoint URL (for remote transports)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// HTTP headers (for remote transports)
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Whether this server is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl McpConfig {
    /// Merge with another MCP config (other takes precedence)
    pub fn merge(&mut self, other: McpConfig) {
        for (name, config) in other.servers {
            self.servers.insert(name, config);
        }
        self.request_timeout_ms = other.request_timeout_ms;
        self.health = other.health;
        self.shutdown_grace_ms = other.shutdown_grace_ms;
    }

    /// Enabled servers, sorted by name
    pub fn enabled_servers(&self) -> Vec<(&String, &McpServerConfig)> {
        let mut servers: Vec<_> = self
            .servers
            .iter()
            .filter(|(_, config)| config.enabled)
            .collect();
        servers.sort_by(|a, b| a.0.cmp(b.0));
        servers
    }

    /// Per-request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check numeric settings and every server entry
    pub fn validate(&self) -> Result<(), McpError> {
        if self.request_timeout_ms == 0 {
            return Err(McpError::invalid_config("request_timeout_ms must be > 0"));
        }
        if self.health.interval_ms == 0 {
            return Err(McpError::invalid_config("health.interval_ms must be > 0"));
        }
        if self.health.probe_timeout_ms == 0 {
            return Err(McpError::invalid_config("health.probe_timeout_ms must be > 0"));
        }
        if self.health.restart_backoff_multiplier < 1.0 {
            return Err(McpError::invalid_config(
                "health.restart_backoff_multiplier must be >= 1.0",
            ));
        }
        if self.health.restart_max_delay_ms < self.health.restart_initial_delay_ms {
            return Err(McpError::invalid_config(
                "health.restart_max_delay_ms must be >= restart_initial_delay_ms",
            ));
        }

        for (name, server) in &self.servers {
            server
                .to_server_config()
                .map_err(|e| McpError::invalid_config(format!("server '{}': {}", name, e)))?;
        }
        Ok(())
    }
}

impl McpServerConfig {
    /// Create a stdio server entry
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: Some("stdio".to_string()),
            command: Some(command.into()),
            args,
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            enabled: true,
        }
    }

    /// Create a remote server entry
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            transport: Some("http".to_string()),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: Some(url.into()),
            headers: HashMap::new(),
            enabled: true,
        }
    }

    /// Add environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Convert to the tagged form, validating it exactly once
    pub fn to_server_config(&self) -> Result<ServerConfig, McpError> {
        let transport = match (self.transport.as_deref(), &self.command, &self.url) {
            (Some(t), _, _) => t.to_ascii_lowercase(),
            (None, Some(_), None) => "stdio".to_string(),
            (None, None, Some(_)) => "http".to_string(),
            (None, Some(_), Some(_)) => {
                return Err(McpError::invalid_config(
                    "both command and url given; set transport explicitly",
                ));
            }
            (None, None, None) => {
                return Err(McpError::invalid_config("either command or url is required"));
            }
        };

        let config = match transport.as_str() {
            "stdio" => {
                let command = self
                    .command
                    .as_deref()
                    .ok_or_else(|| McpError::invalid_config("stdio transport requires command"))?;
                let command = shellexpand::full(command)
                    .map_err(|e| McpError::invalid_config(format!("cannot expand command: {}", e)))?
                    .into_owned();
                ServerConfig::Local {
                    command,
                    args: self.args.clone(),
                    env: self.env.clone(),
                }
            }
            "http" | "https" | "sse" | "websocket" => {
                let url = self.url.clone().ok_or_else(|| {
                    McpError::invalid_config(format!("{} transport requires url", transport))
                })?;
                ServerConfig::Remote {
                    url,
                    headers: self.headers.clone(),
                }
            }
            other => {
                return Err(McpError::invalid_config(format!(
                    "unknown transport type: {}",
                    other
                )));
            }
        };

        config.validate()?;
        Ok(config)
    }
}
