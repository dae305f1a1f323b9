//! Warden Core Library
//!
//! Supervises MCP (Model Context Protocol) tool servers: spawns them, runs
//! the protocol handshake, correlates requests with responses, probes their
//! health and restarts them with bounded backoff when they fail.

pub mod config;
pub mod error;
pub mod mcp;
pub mod recovery;

// Re-export commonly used types
pub use config::{McpConfig, ServerConfig, WardenConfig, load_config};
pub use error::{WardenError, WardenResult};
pub use mcp::{
    ConnectionState, ConnectionSupervisor, HealthEvent, McpClient, McpError, ServerHealth,
    SupervisorBuilder,
};
pub use recovery::{BackoffConfig, ExponentialBackoff};
