//! Request/response correlation
//!
//! Every in-flight request owns exactly one entry in the pending table. An
//! entry is removed by whichever outcome claims it first (response, deadline,
//! teardown, or the caller dropping its future); whoever removes it decides the
//! outcome, so a request never completes twice.

use super::error::McpError;
use super::protocol::{McpResponse, RequestId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// Default per-request deadline
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

type Outcome = Result<Value, McpError>;

struct PendingRequest {
    method: String,
    sent_at: Instant,
    sender: oneshot::Sender<Outcome>,
}

/// Matches responses to the requests that produced them
pub struct RpcCorrelator {
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    default_timeout: Duration,
}

impl RpcCorrelator {
    /// Create a correlator with the given default deadline
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
            default_timeout,
        }
    }

    /// Default deadline applied by [`RpcCorrelator::register`] callers
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Allocate a fresh, strictly increasing request id
    pub fn allocate_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Record a pending request.
    ///
    /// Fails if an entry with the same id is still outstanding.
    pub fn register(
        self: &Arc<Self>,
        id: RequestId,
        method: impl Into<String>,
        timeout: Duration,
    ) -> Result<PendingResponse, McpError> {
        let method = method.into();
        let (sender, receiver) = oneshot::channel();

        match self.pending.lock().entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(McpError::transport(format!(
                    "request id {} is already pending",
                    id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    method: method.clone(),
                    sent_at: Instant::now(),
                    sender,
                });
            }
        }

        Ok(PendingResponse {
            correlator: Arc::clone(self),
            id,
            method,
            timeout,
            receiver,
        })
    }

    /// Deliver a response to its pending request.
    ///
    /// Returns `false` when no request is waiting for this id (for example a
    /// late reply after the deadline fired); the response is then discarded.
    pub fn resolve(&self, response: McpResponse) -> bool {
        let Some(entry) = self.pending.lock().remove(&response.id) else {
            debug!(request_id = %response.id, "discarding response for unknown request");
            return false;
        };

        trace!(
            request_id = %response.id,
            method = %entry.method,
            elapsed_ms = entry.sent_at.elapsed().as_millis() as u64,
            "resolved request"
        );

        let outcome = response.into_result().map_err(McpError::from);
        // The receiver may be gone if the caller gave up concurrently.
        let _ = entry.sender.send(outcome);
        true
    }

    /// Remove an entry without completing it. Returns the method name if the
    /// entry was still pending.
    pub fn forget(&self, id: &RequestId) -> Option<String> {
        self.pending.lock().remove(id).map(|entry| entry.method)
    }

    /// Fail every outstanding request with `reason` and clear the table
    pub fn reject_all(&self, reason: &McpError) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            debug!(request_id = %id, method = %entry.method, "rejecting pending request");
            let _ = entry.sender.send(Err(reason.clone()));
        }
        count
    }

    /// Number of requests currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether an entry exists for `id`
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.pending.lock().contains_key(id)
    }
}

impl Default for RpcCorrelator {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

/// Handle to one registered request.
///
/// Dropping it before completion removes the pending entry.
pub struct PendingResponse {
    correlator: Arc<RpcCorrelator>,
    id: RequestId,
    method: String,
    timeout: Duration,
    receiver: oneshot::Receiver<Outcome>,
}

impl PendingResponse {
    /// The request id this handle waits on
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// The method name of the request
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Wait for the outcome or the deadline, whichever comes first
    pub async fn wait(mut self) -> Result<Value, McpError> {
        let elapsed = tokio::time::timeout(self.timeout, &mut self.receiver).await;

        match elapsed {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::connection_closed("response channel closed")),
            Err(_) => {
                if self.correlator.forget(&self.id).is_some() {
                    Err(McpError::timeout(
                        self.method.clone(),
                        self.timeout.as_millis() as u64,
                    ))
                } else {
                    // Another outcome claimed the entry in the same tick.
                    match self.receiver.try_recv() {
                        Ok(outcome) => outcome,
                        Err(_) => Err(McpError::connection_closed("response channel closed")),
                    }
                }
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        // No-op once an outcome claimed the entry; ids are never reused.
        self.correlator.forget(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::McpRpcError;
    use serde_json::json;

    fn correlator() -> Arc<RpcCorrelator> {
        Arc::new(RpcCorrelator::new(Duration::from_millis(200)))
    }

    #[test]
    fn test_ids_are_strictly_increasing() {
        let c = correlator();
        let a = c.allocate_id();
        let b = c.allocate_id();
        match (a, b) {
            (RequestId::Number(a), RequestId::Number(b)) => assert!(b > a),
            other => panic!("unexpected ids: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_pending_id_is_rejected() {
        let c = correlator();
        let id = c.allocate_id();
        let _first = c.register(id.clone(), "ping", c.default_timeout()).unwrap();
        assert!(c.register(id, "ping", c.default_timeout()).is_err());
        assert_eq!(c.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_resolve_delivers_result() {
        let c = correlator();
        let id = c.allocate_id();
        let pending = c.register(id.clone(), "echo", c.default_timeout()).unwrap();

        assert!(c.resolve(McpResponse::success(id, json!({"ok": true}))));
        let value = pending.wait().await.unwrap();
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(c.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_maps_error_payload() {
        let c = correlator();
        let id = c.allocate_id();
        let pending = c.register(id.clone(), "nope", c.default_timeout()).unwrap();

        c.resolve(McpResponse::error(id, McpRpcError::method_not_found()));
        match pending.wait().await {
            Err(McpError::Protocol { code, message, .. }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_response_is_discarded() {
        let c = correlator();
        let id = c.allocate_id();
        let _pending = c.register(id, "ping", c.default_timeout()).unwrap();

        assert!(!c.resolve(McpResponse::success(999i64, json!(null))));
        assert_eq!(c.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_removes_entry_before_late_response() {
        let c = correlator();
        let id = c.allocate_id();
        let pending = c
            .register(id.clone(), "slow", Duration::from_millis(20))
            .unwrap();

        match pending.wait().await {
            Err(McpError::Timeout { method, timeout_ms }) => {
                assert_eq!(method, "slow");
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!c.is_pending(&id));
        assert!(!c.resolve(McpResponse::success(id, json!(1))));
    }

    #[tokio::test]
    async fn test_reject_all_fails_every_pending_request() {
        let c = correlator();
        let first = c.register(c.allocate_id(), "a", c.default_timeout()).unwrap();
        let second = c.register(c.allocate_id(), "b", c.default_timeout()).unwrap();

        let rejected = c.reject_all(&McpError::connection_closed("server disconnected"));
        assert_eq!(rejected, 2);
        assert_eq!(c.pending_count(), 0);

        for pending in [first, second] {
            assert!(matches!(
                pending.wait().await,
                Err(McpError::ConnectionClosed { .. })
            ));
        }
    }

    #[test]
    fn test_dropping_handle_forgets_entry() {
        let c = correlator();
        let id = c.allocate_id();
        let pending = c.register(id.clone(), "ping", c.default_timeout()).unwrap();
        drop(pending);
        assert!(!c.is_pending(&id));
    }
}
