//! Warden
//!
//! Keeps MCP tool servers connected. See [`warden_core`] for the library and
//! the `warden` binary in `crates/warden-cli` for the command line.

pub use warden_core::*;
