//! Standard I/O transport for MCP
//!
//! Spawns a subprocess and communicates via stdin/stdout. Stderr is exposed
//! as the diagnostic stream.

use super::{DEFAULT_SHUTDOWN_GRACE, McpTransport, pump_reader};
use crate::mcp::error::McpError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Stdio transport for MCP communication
pub struct StdioTransport {
    /// Command the worker was launched with, for error messages
    command: String,
    /// Child process
    child: Option<Child>,
    /// Stdin writer
    stdin: Option<ChildStdin>,
    /// Stdout chunks, until taken by the client
    output: Option<mpsc::Receiver<Vec<u8>>>,
    /// Stderr chunks, until taken by the client
    diagnostics: Option<mpsc::Receiver<Vec<u8>>>,
    pid: Option<u32>,
    shutdown_grace: Duration,
}

impl StdioTransport {
    /// Spawn a new MCP server process
    pub fn spawn(command: impl AsRef<str>, args: &[impl AsRef<str>]) -> Result<Self, McpError> {
        Self::spawn_with_env(command, args, &HashMap::new())
    }

    /// Spawn with additional environment variables
    ///
    /// The worker inherits the current environment; `env` entries are added
    /// on top of it.
    pub fn spawn_with_env(
        command: impl AsRef<str>,
        args: &[impl AsRef<str>],
        env: &HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let command = command.as_ref();
        let mut cmd = Command::new(command);

        cmd.args(args.iter().map(|a| a.as_ref()))
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::spawn(command, e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn(command, "failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn(command, "failed to get stdout handle"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::spawn(command, "failed to get stderr handle"))?;

        let pid = child.id();
        debug!(command, pid, "MCP server process started");

        Ok(Self {
            command: command.to_string(),
            child: Some(child),
            stdin: Some(stdin),
            output: Some(pump_reader(stdout, "stdout")),
            diagnostics: Some(pump_reader(stderr, "stderr")),
            pid,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// Set how long the worker gets to exit after SIGTERM
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    #[cfg(unix)]
    fn terminate(&self, child: &Child) {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => debug!(pid, "SIGTERM failed: {}", e),
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, _child: &Child) {}
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), McpError> {
        let stdin = self.stdin.as_mut().ok_or(McpError::NotConnected)?;

        stdin.write_all(bytes).await.map_err(|e| {
            McpError::transport(format!("write to '{}' failed: {}", self.command, e))
        })?;
        stdin.flush().await.map_err(|e| {
            McpError::transport(format!("flush to '{}' failed: {}", self.command, e))
        })?;

        Ok(())
    }

    fn take_output(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.output.take()
    }

    fn take_diagnostics(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.diagnostics.take()
    }

    async fn kill(&mut self) -> Result<(), McpError> {
        // Close stdin to signal EOF
        self.stdin.take();

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!(command = %self.command, %status, "MCP server already exited");
            return Ok(());
        }

        self.terminate(&child);

        match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(command = %self.command, %status, "MCP server exited");
            }
            Ok(Err(e)) => {
                warn!(command = %self.command, "failed to wait for MCP server: {}", e);
            }
            Err(_) => {
                debug!(command = %self.command, "MCP server ignored SIGTERM, killing");
                if let Err(e) = child.kill().await {
                    warn!(command = %self.command, "failed to kill MCP server: {}", e);
                }
            }
        }

        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_executable_fails() {
        let result = StdioTransport::spawn("/nonexistent/warden-test-binary", &[] as &[&str]);
        match result {
            Err(McpError::Spawn { command, .. }) => {
                assert_eq!(command, "/nonexistent/warden-test-binary")
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[tokio::test]
    async fn test_echo_round_trip_and_kill() {
        let mut transport = StdioTransport::spawn("cat", &[] as &[&str]).unwrap();
        let mut output = transport.take_output().unwrap();
        assert!(transport.take_output().is_none());
        assert!(transport.pid().is_some());

        transport.write(b"ping\n").await.unwrap();
        let mut received = Vec::new();
        while received.len() < 5 {
            received.extend(output.recv().await.unwrap());
        }
        assert_eq!(received, b"ping\n");

        assert!(transport.is_alive());
        transport.kill().await.unwrap();
        assert!(!transport.is_alive());
        transport.kill().await.unwrap();

        assert!(matches!(
            transport.write(b"late\n").await,
            Err(McpError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_diagnostics_stream() {
        let mut transport = StdioTransport::spawn("sh", &["-c", "echo oops >&2"]).unwrap();
        let mut diagnostics = transport.take_diagnostics().unwrap();

        let mut received = Vec::new();
        while let Some(chunk) = diagnostics.recv().await {
            received.extend(chunk);
        }
        assert_eq!(received, b"oops\n");
    }

    #[tokio::test]
    async fn test_sigterm_ignored_falls_back_to_kill() {
        let mut transport = StdioTransport::spawn(
            "sh",
            &["-c", "trap '' TERM; while true; do sleep 1; done"],
        )
        .unwrap()
        .with_shutdown_grace(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.kill().await.unwrap();
        assert!(!transport.is_alive());
    }
}
