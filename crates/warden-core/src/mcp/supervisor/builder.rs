//! Supervisor options and builder

use super::manager::ConnectionSupervisor;
use crate::config::McpConfig;
use crate::mcp::client::{LoggingNotificationHandler, NotificationHandler};
use crate::mcp::error::McpError;
use crate::mcp::transport::{DEFAULT_SHUTDOWN_GRACE, ProcessTransportFactory, TransportFactory};
use crate::mcp::types::InitializeParams;
use crate::recovery::BackoffConfig;
use std::sync::Arc;
use std::time::Duration;

/// Policy knobs shared by every connection of a supervisor
#[derive(Clone)]
pub struct SupervisorOptions {
    /// Default deadline for requests and the handshake
    pub request_timeout: Duration,
    /// Start health monitoring automatically after a successful connect
    pub auto_monitor: bool,
    /// Probe period of automatically started monitors
    pub health_interval: Duration,
    /// Deadline of a single `ping` probe
    pub probe_timeout: Duration,
    /// Restart attempts per failure cycle; 0 disables restarts
    pub max_restart_attempts: u32,
    /// Delay schedule between restart attempts
    pub backoff: BackoffConfig,
    /// Parameters sent in `initialize`
    pub init_params: InitializeParams,
    /// Receives server-initiated notifications
    pub notification_handler: Arc<dyn NotificationHandler>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            auto_monitor: true,
            health_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            max_restart_attempts: 3,
            backoff: BackoffConfig::default(),
            init_params: InitializeParams::default(),
            notification_handler: Arc::new(LoggingNotificationHandler),
        }
    }
}

impl SupervisorOptions {
    /// Options from the `mcp` configuration section
    pub fn from_config(config: &McpConfig) -> Self {
        let health = &config.health;
        Self {
            request_timeout: config.request_timeout(),
            auto_monitor: health.enabled,
            health_interval: Duration::from_millis(health.interval_ms),
            probe_timeout: Duration::from_millis(health.probe_timeout_ms),
            max_restart_attempts: health.max_restart_attempts,
            backoff: BackoffConfig::from_health_config(health),
            ..Self::default()
        }
    }
}

impl SupervisorOptions {
    /// Reject settings no timer can run with
    pub fn validate(&self) -> Result<(), McpError> {
        if self.request_timeout.is_zero() {
            return Err(McpError::invalid_config("request timeout must be > 0"));
        }
        if self.health_interval.is_zero() {
            return Err(McpError::invalid_config("health interval must be > 0"));
        }
        if self.probe_timeout.is_zero() {
            return Err(McpError::invalid_config("probe timeout must be > 0"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SupervisorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorOptions")
            .field("request_timeout", &self.request_timeout)
            .field("auto_monitor", &self.auto_monitor)
            .field("health_interval", &self.health_interval)
            .field("probe_timeout", &self.probe_timeout)
            .field("max_restart_attempts", &self.max_restart_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionSupervisor`]
pub struct SupervisorBuilder {
    options: SupervisorOptions,
    factory: Option<Arc<dyn TransportFactory>>,
    shutdown_grace: Duration,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            options: SupervisorOptions::default(),
            factory: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Start from the `mcp` configuration section
    pub fn from_config(config: &McpConfig) -> Self {
        Self {
            options: SupervisorOptions::from_config(config),
            factory: None,
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
        }
    }

    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    pub fn with_auto_monitor(mut self, enabled: bool) -> Self {
        self.options.auto_monitor = enabled;
        self
    }

    /// Probe period of automatic monitors. Must be non-zero; checked by
    /// [`build`](Self::build).
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.options.health_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.options.probe_timeout = timeout;
        self
    }

    pub fn with_max_restart_attempts(mut self, attempts: u32) -> Self {
        self.options.max_restart_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.options.backoff = backoff;
        self
    }

    pub fn with_init_params(mut self, params: InitializeParams) -> Self {
        self.options.init_params = params;
        self
    }

    pub fn with_notification_handler(mut self, handler: Arc<dyn NotificationHandler>) -> Self {
        self.options.notification_handler = handler;
        self
    }

    /// Grace period before a stopping worker is force-killed.
    /// Only used by the default process factory.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Replace how workers are started
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Validate the options and create the supervisor
    pub fn build(self) -> Result<ConnectionSupervisor, McpError> {
        let factory = self.factory.unwrap_or_else(|| {
            Arc::new(ProcessTransportFactory::new().with_shutdown_grace(self.shutdown_grace))
        });
        ConnectionSupervisor::new(factory, self.options)
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
