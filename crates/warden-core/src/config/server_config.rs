//! Validated per-server launch configuration

use crate::mcp::error::McpError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How to reach one MCP server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerConfig {
    /// Spawn a local worker and talk over its stdio pipes
    Local {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Remote endpoint (accepted by validation; no transport ships for it yet)
    Remote {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl ServerConfig {
    /// Local worker launched with `command args...`
    pub fn local<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Local {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
        }
    }

    /// Remote endpoint
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote {
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Add an environment variable (local only)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Local { env, .. } = &mut self {
            env.insert(key.into(), value.into());
        }
        self
    }

    /// Add an HTTP header (remote only)
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Remote { headers, .. } = &mut self {
            headers.insert(key.into(), value.into());
        }
        self
    }

    /// Whether this config launches a local worker
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }

    /// Check the config can be acted on
    pub fn validate(&self) -> Result<(), McpError> {
        match self {
            Self::Local { command, .. } => {
                if command.trim().is_empty() {
                    return Err(McpError::invalid_config("local server requires a command"));
                }
                Ok(())
            }
            Self::Remote { url, .. } => validate_url(url),
        }
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { command, args, .. } if args.is_empty() => write!(f, "{}", command),
            Self::Local { command, args, .. } => write!(f, "{} {}", command, args.join(" ")),
            Self::Remote { url, .. } => write!(f, "{}", url),
        }
    }
}

pub(crate) fn validate_url(url: &str) -> Result<(), McpError> {
    const SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];

    let Some(scheme) = SCHEMES.iter().find(|s| url.starts_with(**s)) else {
        return Err(McpError::invalid_config(format!(
            "unsupported URL '{}': expected http(s):// or ws(s)://",
            url
        )));
    };
    if url.len() == scheme.len() {
        return Err(McpError::invalid_config(format!("URL '{}' has no host", url)));
    }
    Ok(())
}
