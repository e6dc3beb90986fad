//! LSP-compliant error types for editor-facing failures.
//!
//! Only transport failures reach the editor; they are reported with the
//! LSP 3.17 `RequestFailed` code so clients show a generic failure instead of
//! treating the router as broken.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_lsp_server::jsonrpc;

use crate::error::RouterError;

/// LSP-compliant error codes (LSP 3.17+)
pub struct ErrorCodes;

impl ErrorCodes {
    /// Request failed but was syntactically correct (LSP 3.17)
    /// Use for: backing server failures, timeouts, undecodable responses
    pub const REQUEST_FAILED: i32 = -32803;

    /// Server cancelled the request (LSP 3.17)
    pub const SERVER_CANCELLED: i32 = -32802;

    /// Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// LSP-compliant error response structure (LSP 3.x § Response Message)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    /// LSP error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Optional additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    /// Create a REQUEST_FAILED error for timeout scenarios
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCodes::REQUEST_FAILED,
            message: message.into(),
            data: Some(serde_json::json!({"reason": "timeout"})),
        }
    }

    /// Create a REQUEST_FAILED error for general failures
    pub fn request_failed(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCodes::REQUEST_FAILED,
            message: message.into(),
            data: None,
        }
    }

    /// Create an INTERNAL_ERROR for router bugs
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCodes::INTERNAL_ERROR,
            message: message.into(),
            data: None,
        }
    }

    /// Convert into the JSON-RPC error returned to the editor.
    pub fn into_jsonrpc(self) -> jsonrpc::Error {
        jsonrpc::Error {
            code: jsonrpc::ErrorCode::ServerError(i64::from(self.code)),
            message: Cow::Owned(self.message),
            data: self.data,
        }
    }
}

impl From<&RouterError> for ResponseError {
    fn from(error: &RouterError) -> Self {
        match error {
            RouterError::Timeout {
                server, timeout_ms, ..
            } => {
                let mut response = ResponseError::timeout(error.to_string());
                response.data = Some(serde_json::json!({
                    "reason": "timeout",
                    "server": server,
                    "timeout_ms": timeout_ms,
                }));
                response
            }
            RouterError::Transport { server, .. }
            | RouterError::InvalidResponse { server, .. }
            | RouterError::ServerNotFound { server } => ResponseError {
                code: ErrorCodes::REQUEST_FAILED,
                message: error.to_string(),
                data: Some(serde_json::json!({"server": server})),
            },
            _ => ResponseError::internal(error.to_string()),
        }
    }
}

impl From<RouterError> for jsonrpc::Error {
    fn from(error: RouterError) -> Self {
        ResponseError::from(&error).into_jsonrpc()
    }
}
