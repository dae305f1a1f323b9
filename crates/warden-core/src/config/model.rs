//! Top-level configuration model

use super::logging_config::LoggingConfig;
use super::mcp_config::McpConfig;
use crate::error::{WardenError, WardenResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default configuration file, relative to the home directory
pub const DEFAULT_CONFIG_FILE: &str = ".warden/config.json";

/// Complete Warden configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardenConfig {
    /// MCP servers and supervision policy
    #[serde(default)]
    pub mcp: McpConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WardenConfig {
    /// Merge with another config; `other` wins
    pub fn merge(&mut self, other: WardenConfig) {
        self.mcp.merge(other.mcp);
        self.logging.merge(other.logging);
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> WardenResult<()> {
        self.mcp
            .validate()
            .map_err(|e| WardenError::config_with_context(e.to_string(), "validating mcp section"))
    }
}

/// `~/.warden/config.json`, if a home directory is known
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
}
