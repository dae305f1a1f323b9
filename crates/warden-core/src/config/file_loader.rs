//! File-based configuration loading

use super::model::WardenConfig;
use crate::error::{WardenError, WardenResult};
use std::fs;
use std::path::Path;

/// Load configuration from a file
///
/// Supports JSON, TOML, and YAML formats based on file extension.
/// Returns default config if file doesn't exist.
pub fn load_from_file(path: &Path) -> WardenResult<WardenConfig> {
    if !path.exists() {
        tracing::debug!("config file {} not found, using defaults", path.display());
        return Ok(WardenConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| {
        WardenError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    parse_config(&content, path)
}

fn parse_config(content: &str, path: &Path) -> WardenResult<WardenConfig> {
    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::from_str(content).map_err(|e| {
            WardenError::config_with_context(
                format!("Failed to parse TOML config: {}", e),
                format!("Deserializing TOML configuration from '{}'", path.display()),
            )
        })?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(content).map_err(|e| {
            WardenError::config_with_context(
                format!("Failed to parse YAML config: {}", e),
                format!("Deserializing YAML configuration from '{}'", path.display()),
            )
        })?,
        _ => serde_json::from_str(content).map_err(|e| {
            WardenError::config_with_context(
                format!("Failed to parse JSON config: {}", e),
                format!("Deserializing JSON configuration from '{}'", path.display()),
            )
        })?,
    };

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let config_json = r#"{
            "mcp": {
                "servers": {
                    "files": {"command": "npx", "args": ["-y", "@mcp/fs"]}
                },
                "request_timeout_ms": 10000,
                "health": {"interval_ms": 5000, "max_restart_attempts": 5}
            },
            "logging": {"level": "debug"}
        }"#;
        fs::write(&config_path, config_json).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.mcp.request_timeout_ms, 10_000);
        assert_eq!(config.mcp.health.interval_ms, 5_000);
        assert_eq!(config.mcp.health.max_restart_attempts, 5);
        assert_eq!(config.mcp.health.probe_timeout_ms, 5_000);
        assert_eq!(config.logging.level, "debug");
        assert!(config.mcp.servers.contains_key("files"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let config_toml = r#"
[mcp]
request_timeout_ms = 15000

[mcp.servers.git]
command = "uvx"
args = ["mcp-server-git"]

[mcp.servers.remote]
url = "https://mcp.example.com"
enabled = false
"#;
        fs::write(&config_path, config_toml).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.mcp.request_timeout_ms, 15_000);
        assert_eq!(config.mcp.servers.len(), 2);
        assert!(!config.mcp.servers["remote"].enabled);
    }

    #[test]
    fn test_load_from_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let config_yaml = r#"
mcp:
  mcpServers:
    memory:
      command: node
      args: [memory.js]
      env:
        DEBUG: "1"
logging:
  format: json
"#;
        fs::write(&config_path, config_yaml).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.mcp.servers["memory"].env["DEBUG"], "1");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_from_file(&temp_dir.path().join("absent.json")).unwrap();
        assert!(config.mcp.servers.is_empty());
    }

    #[test]
    fn test_invalid_file_is_a_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.json");
        fs::write(&config_path, "{ not json").unwrap();

        let err = load_from_file(&config_path).unwrap_err();
        assert!(matches!(err, WardenError::Config { .. }));
        assert!(err.context().unwrap().contains("broken.json"));
    }
}
