//! Model Context Protocol (MCP) client and supervision
//!
//! Speaks newline-delimited JSON-RPC 2.0 with worker processes over their
//! standard streams and keeps those workers alive.
//!
//! ## Layers
//!
//! - [`transport`]: owns a worker and its byte streams
//! - [`codec`]: splits output bytes into frames, encodes outgoing messages
//! - [`correlator`]: matches responses to requests, one outcome per request
//! - [`handshake`]: the `initialize` exchange gating every other request
//! - [`client`]: one session wiring the above together
//! - [`supervisor`]: named connections, health probes and bounded restart
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_core::config::ServerConfig;
//! use warden_core::mcp::ConnectionSupervisor;
//!
//! let supervisor = ConnectionSupervisor::builder().build()?;
//! supervisor.on_health_event(|event| {
//!     println!("{}", event);
//!     Ok(())
//! });
//!
//! supervisor
//!     .connect("files", ServerConfig::local("mcp-server-files", ["--root", "/tmp"]))
//!     .await?;
//! let tools = supervisor.request("files", "tools/list", None).await?;
//! supervisor.cleanup().await;
//! ```

pub mod client;
pub mod codec;
pub mod correlator;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod supervisor;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientOptions, LoggingNotificationHandler, McpClient, NotificationHandler};
pub use codec::LineCodec;
pub use correlator::RpcCorrelator;
pub use error::McpError;
pub use handshake::{Handshake, HandshakeState};
pub use protocol::{McpMessage, McpNotification, McpRequest, McpResponse, McpRpcError, RequestId};
pub use supervisor::{
    ConnectionState, ConnectionSupervisor, HealthEvent, HealthEventBus, ServerHealth,
    SubscriptionId, SupervisorBuilder, SupervisorOptions,
};
pub use transport::{
    McpTransport, ProcessTransportFactory, StdioTransport, StreamTransport, TransportFactory,
};
pub use types::{InitializeParams, InitializeResult, McpCapabilities, McpServerInfo};
