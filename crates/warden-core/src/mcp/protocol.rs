//! MCP protocol message types
//!
//! JSON-RPC 2.0 envelopes as spoken by MCP servers.

use super::error::McpError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version advertised in the initialize request
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC version
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP message types
///
/// Serializes untagged. Inbound parsing goes through [`McpMessage::from_value`]
/// so that discrimination follows the field rules instead of serde's
/// first-match behaviour.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum McpMessage {
    /// Request message
    Request(McpRequest),
    /// Response message
    Response(McpResponse),
    /// Notification message (no id)
    Notification(McpNotification),
}

impl McpMessage {
    /// Classify and decode a parsed JSON object.
    ///
    /// - `id` plus `result` or `error` is a response
    /// - `id` plus `method` is a request
    /// - `method` without `id` is a notification
    pub fn from_value(value: Value) -> Result<Self, McpError> {
        let Some(object) = value.as_object() else {
            return Err(McpError::serialization("message is not a JSON object"));
        };

        let has_id = object.get("id").is_some_and(|id| !id.is_null());
        let has_method = object.contains_key("method");
        let has_outcome = object.contains_key("result") || object.contains_key("error");

        if has_id && has_outcome {
            Ok(Self::Response(serde_json::from_value(value)?))
        } else if has_id && has_method {
            Ok(Self::Request(serde_json::from_value(value)?))
        } else if has_method {
            Ok(Self::Notification(serde_json::from_value(value)?))
        } else {
            Err(McpError::serialization(
                "message is neither a request, a response nor a notification",
            ))
        }
    }

    /// Check if this is a response
    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    /// Check if this is a request
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    /// Check if this is a notification
    pub fn is_notification(&self) -> bool {
        matches!(self, Self::Notification(_))
    }

    /// Get the message ID if present
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(req) => Some(&req.id),
            Self::Response(res) => Some(&res.id),
            Self::Notification(_) => None,
        }
    }
}

impl From<McpRequest> for McpMessage {
    fn from(request: McpRequest) -> Self {
        Self::Request(request)
    }
}

impl From<McpResponse> for McpMessage {
    fn from(response: McpResponse) -> Self {
        Self::Response(response)
    }
}

impl From<McpNotification> for McpMessage {
    fn from(notification: McpNotification) -> Self {
        Self::Notification(notification)
    }
}

/// Request ID (can be string or number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String ID
    String(String),
    /// Number ID
    Number(i64),
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    /// JSON-RPC version
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Method name
    pub method: String,
    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    /// Create a new request
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    /// Add parameters to the request
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    /// JSON-RPC version
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Request ID this response corresponds to
    pub id: RequestId,
    /// Result (present on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (present on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpRpcError>,
}

impl McpResponse {
    /// Create a success response
    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: impl Into<RequestId>, error: McpRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Check if this is a success response
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Get the result, consuming the response
    pub fn into_result(self) -> Result<Value, McpRpcError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpRpcError {
    /// Create a new error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Add data to the error
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Method not found (-32601)
    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found")
    }
}

impl std::fmt::Display for McpRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for McpRpcError {}

impl From<McpRpcError> for McpError {
    fn from(err: McpRpcError) -> Self {
        McpError::Protocol {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// JSON-RPC notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpNotification {
    /// JSON-RPC version
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpNotification {
    /// Create a new notification
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: None,
        }
    }

    /// Add parameters
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// MCP method names
pub mod methods {
    /// Initialize
    pub const INITIALIZE: &str = "initialize";
    /// Initialized notification
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Ping
    pub const PING: &str = "ping";
    /// Cancellation notification
    pub const CANCELLED: &str = "notifications/cancelled";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = McpRequest::new(1i64, "tools/list").with_params(json!({}));
        let json = serde_json::to_string(&req).unwrap();

        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"params\":{}"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let notif = McpNotification::new(methods::INITIALIZED);
        let json = serde_json::to_string(&McpMessage::from(notif)).unwrap();

        assert!(!json.contains("\"id\""));
        assert!(!json.contains("params"));
        assert!(json.contains("notifications/initialized"));
    }

    #[test]
    fn test_discriminates_response() {
        let msg = McpMessage::from_value(json!({"jsonrpc":"2.0","id":1,"result":{}})).unwrap();
        assert!(msg.is_response());
        assert_eq!(msg.id(), Some(&RequestId::Number(1)));
    }

    #[test]
    fn test_discriminates_null_result_as_response() {
        let msg = McpMessage::from_value(json!({"jsonrpc":"2.0","id":4,"result":null})).unwrap();
        match msg {
            McpMessage::Response(res) => assert_eq!(res.into_result().unwrap(), Value::Null),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_discriminates_error_response() {
        let msg = McpMessage::from_value(json!({
            "jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"Method not found"}
        }))
        .unwrap();
        match msg {
            McpMessage::Response(res) => {
                assert!(!res.is_success());
                assert_eq!(res.into_result().unwrap_err().code, -32601);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_discriminates_request_and_notification() {
        let req = McpMessage::from_value(json!({"jsonrpc":"2.0","id":"a","method":"roots/list"}))
            .unwrap();
        assert!(req.is_request());

        let notif =
            McpMessage::from_value(json!({"jsonrpc":"2.0","method":"notifications/progress"}))
                .unwrap();
        assert!(notif.is_notification());
    }

    #[test]
    fn test_rejects_unclassifiable_messages() {
        assert!(McpMessage::from_value(json!({"jsonrpc":"2.0","id":1})).is_err());
        assert!(McpMessage::from_value(json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_rpc_error_converts_to_protocol_error() {
        let err: McpError = McpRpcError::new(-32000, "boom")
            .with_data(json!({"detail": 1}))
            .into();
        match err {
            McpError::Protocol { code, message, data } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "boom");
                assert!(data.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
