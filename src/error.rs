//! Error handling types for razor-router
//!
//! Only transport-level failures travel all the way up to the editor. Missing
//! documents, stale mappings and synchronization timeouts are recovered where
//! they happen and degrade to "no result".

use std::sync::PoisonError;
use thiserror::Error;

/// Comprehensive error type for router operations
#[derive(Debug, Error)]
pub enum RouterError {
    /// Lock acquisition failed or was poisoned
    #[error("Lock acquisition failed: {message}")]
    Lock { message: String },

    /// No backing server registered under this name
    #[error("Backing server not registered: {server}")]
    ServerNotFound { server: String },

    /// Backing server unreachable or answered with a protocol-level error
    #[error("Transport failure talking to {server} ({method}): {message}")]
    Transport {
        server: String,
        method: String,
        message: String,
    },

    /// Backing server did not answer in time
    #[error("Request {method} to {server} timed out after {timeout_ms}ms")]
    Timeout {
        server: String,
        method: String,
        timeout_ms: u64,
    },

    /// Backing server answered with a payload that does not decode
    #[error("Invalid response from {server} for {method}: {source}")]
    InvalidResponse {
        server: String,
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// Document not found in store
    #[error("Document not found: {uri}")]
    DocumentNotFound { uri: String },

    /// A text change could not be applied to a snapshot
    #[error("Invalid text edit: {message}")]
    InvalidEdit { message: String },

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;

/// Helper trait to convert PoisonError to RouterError
pub trait LockResultExt<T> {
    /// Convert a PoisonError to RouterError with recovery and logging.
    ///
    /// The context parameter identifies which operation triggered lock recovery.
    fn recover_poison(self, context: &str) -> Result<T, RouterError>;
}

impl<T> LockResultExt<T> for Result<T, PoisonError<T>> {
    fn recover_poison(self, context: &str) -> Result<T, RouterError> {
        match self {
            Ok(guard) => Ok(guard),
            Err(poisoned) => {
                log::warn!(
                    target: "razor_router::lock_recovery",
                    "Recovered from poisoned lock in {}",
                    context
                );
                Ok(poisoned.into_inner())
            }
        }
    }
}

impl RouterError {
    /// Create a lock error
    pub fn lock(message: impl Into<String>) -> Self {
        RouterError::Lock {
            message: message.into(),
        }
    }

    /// Create a server not found error
    pub fn server_not_found(server: impl Into<String>) -> Self {
        RouterError::ServerNotFound {
            server: server.into(),
        }
    }

    /// Create a transport error
    pub fn transport(
        server: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        RouterError::Transport {
            server: server.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    /// Create a document not found error
    pub fn document_not_found(uri: impl Into<String>) -> Self {
        RouterError::DocumentNotFound { uri: uri.into() }
    }

    /// Create an invalid edit error
    pub fn invalid_edit(message: impl Into<String>) -> Self {
        RouterError::InvalidEdit {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        RouterError::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        RouterError::Internal(message.into())
    }

    /// Whether this error is a transport-level failure that should reach the editor.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            RouterError::Transport { .. }
                | RouterError::Timeout { .. }
                | RouterError::InvalidResponse { .. }
                | RouterError::ServerNotFound { .. }
        )
    }
}
