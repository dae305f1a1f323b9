//! Connection supervision
//!
//! [`ConnectionSupervisor`] keeps named MCP servers connected: it runs the
//! handshake, probes each ready session periodically, and restarts failed
//! workers with exponential backoff up to a bounded number of attempts.
//! Every transition is published as a [`HealthEvent`].
//!
//! ```text
//! disconnected -> connecting -> handshaking -> ready <-> unhealthy
//!                      ^                                   |
//!                      +----------- restarting <-----------+
//!                                       |
//!                                       v
//!                                    failed
//! ```

mod builder;
mod connection;
mod events;
mod health;
mod lifecycle;
mod manager;
mod types;

pub use builder::{SupervisorBuilder, SupervisorOptions};
pub use events::{HealthEvent, HealthEventBus, HealthEventHandler, SubscriptionId};
pub use manager::ConnectionSupervisor;
pub use types::{ConnectionState, ServerHealth};
