//! Notification handler traits and implementations

use serde_json::Value;
use tracing::debug;

/// Receives server notifications from the client's message loop.
///
/// Called inline on the receiver task, so implementations must not block.
pub trait NotificationHandler: Send + Sync {
    /// Handle a notification
    fn handle(&self, server: &str, method: &str, params: Option<Value>);
}

/// Default notification handler that logs notifications
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotificationHandler;

impl NotificationHandler for LoggingNotificationHandler {
    fn handle(&self, server: &str, method: &str, params: Option<Value>) {
        debug!(server, "MCP notification: {} {:?}", method, params);
    }
}
