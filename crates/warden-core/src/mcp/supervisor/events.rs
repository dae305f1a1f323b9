//! Health event bus
//!
//! Subscribers are invoked synchronously in registration order over a
//! snapshot of the subscriber list. A failing or panicking subscriber is
//! logged and skipped; it never stops delivery to the others.

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Capacity of the broadcast channel handed out by `subscribe_channel`
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle transition of one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HealthEvent {
    /// An external connect reached `ready`
    Healthy { server_name: String },
    /// A connect or health check failed
    Unhealthy { server_name: String, error: String },
    /// Restart attempt `attempt` is starting
    Restarting { server_name: String, attempt: u32 },
    /// Restart attempt `attempt` succeeded
    Restarted { server_name: String, attempt: u32 },
    /// All restart attempts failed; the connection is `failed`
    RestartFailed {
        server_name: String,
        error: String,
        attempts: u32,
    },
}

impl HealthEvent {
    /// Server the event belongs to
    pub fn server_name(&self) -> &str {
        match self {
            Self::Healthy { server_name }
            | Self::Unhealthy { server_name, .. }
            | Self::Restarting { server_name, .. }
            | Self::Restarted { server_name, .. }
            | Self::RestartFailed { server_name, .. } => server_name,
        }
    }

    /// Event tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Healthy { .. } => "healthy",
            Self::Unhealthy { .. } => "unhealthy",
            Self::Restarting { .. } => "restarting",
            Self::Restarted { .. } => "restarted",
            Self::RestartFailed { .. } => "restart_failed",
        }
    }
}

impl fmt::Display for HealthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy { server_name } => write!(f, "{}: healthy", server_name),
            Self::Unhealthy { server_name, error } => {
                write!(f, "{}: unhealthy ({})", server_name, error)
            }
            Self::Restarting {
                server_name,
                attempt,
            } => write!(f, "{}: restarting (attempt {})", server_name, attempt),
            Self::Restarted {
                server_name,
                attempt,
            } => write!(f, "{}: restarted (attempt {})", server_name, attempt),
            Self::RestartFailed {
                server_name,
                error,
                attempts,
            } => write!(
                f,
                "{}: restart failed after {} attempts ({})",
                server_name, attempts, error
            ),
        }
    }
}

/// Callback subscriber
pub type HealthEventHandler = Arc<dyn Fn(&HealthEvent) -> anyhow::Result<()> + Send + Sync>;

/// Token returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Multi-subscriber broadcast of health events
pub struct HealthEventBus {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(SubscriptionId, HealthEventHandler)>>,
    channel: broadcast::Sender<HealthEvent>,
}

impl HealthEventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        let (channel, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(Vec::new()),
            channel,
        }
    }

    /// Register a callback
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&HealthEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a callback. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Receive events over a channel instead of a callback.
    ///
    /// Slow receivers lag and lose the oldest events.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<HealthEvent> {
        self.channel.subscribe()
    }

    /// Deliver `event` to every subscriber
    pub fn emit(&self, event: HealthEvent) {
        match &event {
            HealthEvent::Healthy { .. } | HealthEvent::Restarted { .. } => {
                info!(server = %event.server_name(), event = event.kind(), "{}", event)
            }
            HealthEvent::Unhealthy { .. } | HealthEvent::Restarting { .. } => {
                warn!(server = %event.server_name(), event = event.kind(), "{}", event)
            }
            HealthEvent::RestartFailed { .. } => {
                error!(server = %event.server_name(), event = event.kind(), "{}", event)
            }
        }

        let snapshot: Vec<_> = self
            .handlers
            .read()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = event.kind(), "health event handler failed: {:#}", e)
                }
                Err(_) => warn!(event = event.kind(), "health event handler panicked"),
            }
        }

        // No receivers is fine.
        let _ = self.channel.send(event);
    }

    /// Remove every callback
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Number of registered callbacks
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for HealthEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn healthy(name: &str) -> HealthEvent {
        HealthEvent::Healthy {
            server_name: name.to_string(),
        }
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let bus = HealthEventBus::new();
        let recorded = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(|_| Err(anyhow::anyhow!("subscriber A is broken")));
        bus.subscribe(|_| panic!("subscriber B panics"));
        let sink = Arc::clone(&recorded);
        bus.subscribe(move |event| {
            sink.lock().push(event.clone());
            Ok(())
        });

        bus.emit(healthy("x"));
        assert_eq!(*recorded.lock(), vec![healthy("x")]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = HealthEventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(healthy("x"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(healthy("x"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_subscriber_may_unsubscribe_during_dispatch() {
        let bus = Arc::new(HealthEventBus::new());
        let slot = Arc::new(Mutex::new(None::<SubscriptionId>));

        let bus_ref = Arc::clone(&bus);
        let slot_ref = Arc::clone(&slot);
        let id = bus.subscribe(move |_| {
            if let Some(id) = *slot_ref.lock() {
                bus_ref.unsubscribe(id);
            }
            Ok(())
        });
        *slot.lock() = Some(id);

        bus.emit(healthy("x"));
        assert_eq!(bus.handler_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let bus = HealthEventBus::new();
        let mut receiver = bus.subscribe_channel();

        bus.emit(HealthEvent::Restarting {
            server_name: "x".to_string(),
            attempt: 1,
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.kind(), "restarting");
        assert_eq!(event.server_name(), "x");
    }

    #[test]
    fn test_event_serialization() {
        let event = HealthEvent::RestartFailed {
            server_name: "x".to_string(),
            error: "boom".to_string(),
            attempts: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "restart_failed");
        assert_eq!(json["attempts"], 3);
    }

    #[test]
    fn test_clear_removes_all_handlers() {
        let bus = HealthEventBus::new();
        bus.subscribe(|_| Ok(()));
        bus.subscribe(|_| Ok(()));
        bus.clear();
        assert_eq!(bus.handler_count(), 0);
    }
}
