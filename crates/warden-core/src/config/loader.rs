//! Configuration loading from multiple sources
//!
//! Sources are applied in the order they were added; later sources override
//! earlier ones. The result is validated once at the end.

use super::env_loader;
use super::file_loader;
use super::model::{WardenConfig, default_config_path};
use crate::error::WardenResult;
use std::path::{Path, PathBuf};

/// Source of configuration data
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Configuration from a file
    File(PathBuf),
    /// `WARDEN_*` environment variables
    Environment,
    /// Built-in defaults
    Default,
}

/// Configuration loader with support for multiple sources
#[derive(Debug, Default)]
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration source
    pub fn add_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Self {
        self.add_source(ConfigSource::File(path.as_ref().to_path_buf()))
    }

    /// Add environment variables source
    pub fn with_env(self) -> Self {
        self.add_source(ConfigSource::Environment)
    }

    /// Add default configuration source
    pub fn with_defaults(self) -> Self {
        self.add_source(ConfigSource::Default)
    }

    /// Load configuration from all sources
    pub fn load(self) -> WardenResult<WardenConfig> {
        let mut config = WardenConfig::default();

        for source in &self.sources {
            match source {
                ConfigSource::File(path) => {
                    tracing::debug!("Loading config from file: {}", path.display());
                    config.merge(file_loader::load_from_file(path)?);
                }
                ConfigSource::Environment => {
                    tracing::debug!("Applying environment overrides");
                    env_loader::apply_env_overrides(&mut config)?;
                }
                ConfigSource::Default => {
                    config = WardenConfig::default();
                }
            }
        }

        config.validate()?;
        tracing::debug!(servers = config.mcp.servers.len(), "configuration loaded");
        Ok(config)
    }
}

/// Load configuration: defaults, then the file, then the environment.
///
/// Without an explicit path, `~/.warden/config.json` is used when a home
/// directory is known.
pub fn load_config(path: Option<&Path>) -> WardenResult<WardenConfig> {
    let mut loader = ConfigLoader::new().with_defaults();

    match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => loader = loader.with_file(path),
        None => tracing::debug!("no home directory, skipping default config file"),
    }

    loader.with_env().load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_later_file_overrides_earlier() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first.json");
        let second = temp_dir.path().join("second.json");
        fs::write(
            &first,
            r#"{"mcp": {"servers": {"a": {"command": "a"}}, "request_timeout_ms": 1000}}"#,
        )
        .unwrap();
        fs::write(
            &second,
            r#"{"mcp": {"servers": {"b": {"command": "b"}}, "request_timeout_ms": 2000}}"#,
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_defaults()
            .with_file(&first)
            .with_file(&second)
            .load()
            .unwrap();

        assert_eq!(config.mcp.request_timeout_ms, 2_000);
        assert!(config.mcp.servers.contains_key("a"));
        assert!(config.mcp.servers.contains_key("b"));
    }

    #[test]
    fn test_invalid_server_fails_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"mcp": {"servers": {"x": {"transport": "pigeon", "command": "x"}}}}"#,
        )
        .unwrap();

        assert!(ConfigLoader::new().with_file(&path).load().is_err());
    }

    #[test]
    fn test_load_config_with_explicit_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::new()
            .with_defaults()
            .with_file(temp_dir.path().join("nope.yaml"))
            .load()
            .unwrap();
        assert_eq!(config.mcp.request_timeout_ms, 30_000);
    }
}
