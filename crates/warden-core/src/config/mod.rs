//! Configuration management
//!
//! Loading (file, environment), the serde model, and conversion of on-disk
//! server entries into validated [`ServerConfig`] values.

pub mod env_loader;
pub mod file_loader;
pub mod loader;
pub mod logging_config;
pub mod mcp_config;
pub mod model;
pub mod server_config;

pub use loader::{ConfigLoader, ConfigSource, load_config};
pub use logging_config::LoggingConfig;
pub use mcp_config::{HealthConfig, McpConfig, McpServerConfig};
pub use model::{DEFAULT_CONFIG_FILE, WardenConfig, default_config_path};
pub use server_config::ServerConfig;
