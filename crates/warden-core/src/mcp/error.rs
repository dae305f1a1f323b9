//! MCP error types

use serde_json::Value;
use thiserror::Error;

/// MCP-specific errors
///
/// Per-request failures (`Timeout`, `Protocol`) only ever reach the caller that
/// issued the request. Connection-level failures (`Spawn`, `HandshakeFailed`,
/// `ConnectionClosed`) are fanned out to every pending request, which is why
/// the type is `Clone`.
#[derive(Debug, Error, Clone)]
pub enum McpError {
    /// The worker process could not be launched
    #[error("Failed to spawn MCP server '{command}': {message}")]
    Spawn { command: String, message: String },

    /// Write attempted with no live process
    #[error("Transport not connected")]
    NotConnected,

    /// Transport I/O failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A request's deadline elapsed
    #[error("Request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The server answered with a JSON-RPC error payload
    #[error("Server error {code}: {message}")]
    Protocol {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    /// An inbound line could not be parsed as a message
    #[error("Malformed frame: {message}")]
    MalformedFrame { message: String, line: String },

    /// The initialize exchange errored or timed out
    #[error("Handshake failed: {message}")]
    HandshakeFailed { message: String },

    /// Automatic restarts gave up
    #[error("Restart failed after {attempts} attempts: {last_error}")]
    RestartExhausted { attempts: u32, last_error: String },

    /// Request attempted before the handshake completed
    #[error("Server '{name}' is not ready (state: {state})")]
    NotReady { name: String, state: String },

    /// Server configuration rejected at connect time
    #[error("Invalid server configuration: {message}")]
    InvalidConfig { message: String },

    /// Accepted by validation but not implemented
    #[error("Unsupported: {message}")]
    Unsupported { message: String },

    /// The session ended while the request was outstanding
    #[error("Connection closed: {reason}")]
    ConnectionClosed { reason: String },

    /// No connection is known under this name
    #[error("Unknown MCP server: {name}")]
    UnknownServer { name: String },

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Handshake already started on this session
    #[error("Client already initialized")]
    AlreadyInitialized,
}

impl McpError {
    /// Create a new Spawn error
    pub fn spawn(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a new Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new Timeout error
    pub fn timeout(method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            method: method.into(),
            timeout_ms,
        }
    }

    /// Create a new Protocol error
    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new MalformedFrame error, keeping a short excerpt of the line
    pub fn malformed(message: impl Into<String>, line: &[u8]) -> Self {
        const EXCERPT: usize = 200;
        let text = String::from_utf8_lossy(line);
        let line = match text.char_indices().nth(EXCERPT) {
            Some((idx, _)) => format!("{}...", &text[..idx]),
            None => text.into_owned(),
        };
        Self::MalformedFrame {
            message: message.into(),
            line,
        }
    }

    /// Create a new HandshakeFailed error
    pub fn handshake_failed(message: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            message: message.into(),
        }
    }

    /// Create a new NotReady error
    pub fn not_ready(name: impl Into<String>, state: impl ToString) -> Self {
        Self::NotReady {
            name: name.into(),
            state: state.to_string(),
        }
    }

    /// Create a new InvalidConfig error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new Unsupported error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a new ConnectionClosed error
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Create a new UnknownServer error
    pub fn unknown_server(name: impl Into<String>) -> Self {
        Self::UnknownServer { name: name.into() }
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "MCP_SPAWN",
            Self::NotConnected => "MCP_NOT_CONNECTED",
            Self::Transport { .. } => "MCP_TRANSPORT",
            Self::Timeout { .. } => "MCP_TIMEOUT",
            Self::Protocol { .. } => "MCP_PROTOCOL",
            Self::MalformedFrame { .. } => "MCP_MALFORMED_FRAME",
            Self::HandshakeFailed { .. } => "MCP_HANDSHAKE_FAILED",
            Self::RestartExhausted { .. } => "MCP_RESTART_EXHAUSTED",
            Self::NotReady { .. } => "MCP_NOT_READY",
            Self::InvalidConfig { .. } => "MCP_INVALID_CONFIG",
            Self::Unsupported { .. } => "MCP_UNSUPPORTED",
            Self::ConnectionClosed { .. } => "MCP_CONNECTION_CLOSED",
            Self::UnknownServer { .. } => "MCP_UNKNOWN_SERVER",
            Self::Serialization { .. } => "MCP_SERIALIZATION",
            Self::AlreadyInitialized => "MCP_ALREADY_INITIALIZED",
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::Transport { .. }
                | Self::Timeout { .. }
                | Self::HandshakeFailed { .. }
                | Self::ConnectionClosed { .. }
                | Self::NotReady { .. }
        )
    }

    /// Failures that take the whole connection down rather than a single request
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. }
                | Self::NotConnected
                | Self::Transport { .. }
                | Self::HandshakeFailed { .. }
                | Self::ConnectionClosed { .. }
                | Self::RestartExhausted { .. }
        )
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err.to_string())
    }
}
