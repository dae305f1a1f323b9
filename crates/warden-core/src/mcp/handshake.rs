//! Initialize/initialized handshake
//!
//! `Idle -> Initializing -> Initialized -> Ready`, or `Failed` from any
//! in-progress state. Runs once per worker process.

use super::error::McpError;
use super::protocol::{MCP_PROTOCOL_VERSION, methods};
use super::types::{InitializeParams, InitializeResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use tracing::{debug, instrument, warn};

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Initializing,
    Initialized,
    Ready,
    Failed,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outbound path used by the handshake.
///
/// Implementations must bypass the readiness gate, since the handshake runs
/// before the session is ready.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HandshakeChannel: Send + Sync {
    /// Send a request and wait for its result
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError>;

    /// Send a fire-and-forget notification
    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), McpError>;
}

/// Capability negotiation state machine
pub struct Handshake {
    params: InitializeParams,
    state: Mutex<HandshakeState>,
    result: Mutex<Option<InitializeResult>>,
}

impl Handshake {
    /// Create an idle handshake that will advertise `params`
    pub fn new(params: InitializeParams) -> Self {
        Self {
            params,
            state: Mutex::new(HandshakeState::Idle),
            result: Mutex::new(None),
        }
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        *self.state.lock()
    }

    /// Whether application requests may be sent
    pub fn is_ready(&self) -> bool {
        self.state() == HandshakeState::Ready
    }

    /// Server's initialize result, once received
    pub fn result(&self) -> Option<InitializeResult> {
        self.result.lock().clone()
    }

    /// Fail fast unless the handshake completed
    pub fn ensure_ready(&self, server: &str) -> Result<(), McpError> {
        match self.state() {
            HandshakeState::Ready => Ok(()),
            state => Err(McpError::not_ready(server, state)),
        }
    }

    /// Mark the handshake failed, e.g. when the session closes underneath it
    pub fn fail(&self) {
        let mut state = self.state.lock();
        if *state != HandshakeState::Ready {
            *state = HandshakeState::Failed;
        }
    }

    /// Run the exchange. Only valid from `Idle`.
    #[instrument(skip_all, level = "debug")]
    pub async fn begin<C>(&self, channel: &C) -> Result<InitializeResult, McpError>
    where
        C: HandshakeChannel + ?Sized,
    {
        {
            let mut state = self.state.lock();
            if *state != HandshakeState::Idle {
                return Err(McpError::AlreadyInitialized);
            }
            *state = HandshakeState::Initializing;
        }

        let params = serde_json::to_value(&self.params)?;
        let raw = match channel.send_request(methods::INITIALIZE, Some(params)).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.transition_failed(err)),
        };

        let result: InitializeResult = match serde_json::from_value(raw) {
            Ok(result) => result,
            Err(err) => {
                return Err(self.transition_failed(McpError::serialization(format!(
                    "invalid initialize result: {}",
                    err
                ))));
            }
        };

        if let Some(version) = result.protocol_version.as_deref() {
            if version != MCP_PROTOCOL_VERSION {
                warn!(
                    server_version = version,
                    client_version = MCP_PROTOCOL_VERSION,
                    "server selected a different protocol version"
                );
            }
        }

        self.set_state(HandshakeState::Initialized);
        *self.result.lock() = Some(result.clone());

        if let Err(err) = channel.send_notification(methods::INITIALIZED, None).await {
            return Err(self.transition_failed(err));
        }

        self.set_state(HandshakeState::Ready);
        debug!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "handshake complete"
        );
        Ok(result)
    }

    fn set_state(&self, next: HandshakeState) {
        *self.state.lock() = next;
    }

    fn transition_failed(&self, cause: McpError) -> McpError {
        self.set_state(HandshakeState::Failed);
        match cause {
            McpError::HandshakeFailed { .. } => cause,
            other => McpError::handshake_failed(other.to_string()),
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new(InitializeParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_successful_handshake_reaches_ready() {
        let mut channel = MockHandshakeChannel::new();
        channel
            .expect_send_request()
            .withf(|method, params| {
                method == methods::INITIALIZE
                    && params
                        .as_ref()
                        .is_some_and(|p| p["protocolVersion"] == MCP_PROTOCOL_VERSION)
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "serverInfo": {"name": "mock", "version": "0.1.0"}
                }))
            });
        channel
            .expect_send_notification()
            .withf(|method, params| method == methods::INITIALIZED && params.is_none())
            .times(1)
            .returning(|_, _| Ok(()));

        let handshake = Handshake::default();
        assert_eq!(handshake.state(), HandshakeState::Idle);

        let result = handshake.begin(&channel).await.unwrap();
        assert_eq!(result.server_info.name, "mock");
        assert_eq!(handshake.state(), HandshakeState::Ready);
        assert!(handshake.ensure_ready("mock").is_ok());
    }

    #[tokio::test]
    async fn test_protocol_error_fails_handshake() {
        let mut channel = MockHandshakeChannel::new();
        channel
            .expect_send_request()
            .returning(|_, _| Err(McpError::protocol(-32603, "Internal error")));
        channel.expect_send_notification().times(0);

        let handshake = Handshake::default();
        let err = handshake.begin(&channel).await.unwrap_err();

        assert!(matches!(err, McpError::HandshakeFailed { .. }));
        assert_eq!(handshake.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn test_timeout_fails_handshake() {
        let mut channel = MockHandshakeChannel::new();
        channel
            .expect_send_request()
            .returning(|method, _| Err(McpError::timeout(method, 30_000)));

        let handshake = Handshake::default();
        let err = handshake.begin(&channel).await.unwrap_err();

        match err {
            McpError::HandshakeFailed { message } => assert!(message.contains("initialize")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_requests_rejected_until_ready() {
        let handshake = Handshake::default();
        match handshake.ensure_ready("files") {
            Err(McpError::NotReady { name, state }) => {
                assert_eq!(name, "files");
                assert_eq!(state, "idle");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handshake_runs_only_once() {
        let mut channel = MockHandshakeChannel::new();
        channel
            .expect_send_request()
            .times(1)
            .returning(|_, _| Ok(json!({})));
        channel
            .expect_send_notification()
            .times(1)
            .returning(|_, _| Ok(()));

        let handshake = Handshake::default();
        handshake.begin(&channel).await.unwrap();
        assert!(matches!(
            handshake.begin(&channel).await,
            Err(McpError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_fail_does_not_downgrade_ready() {
        let handshake = Handshake::default();
        handshake.set_state(HandshakeState::Ready);
        handshake.fail();
        assert_eq!(handshake.state(), HandshakeState::Ready);
    }
}
