use std::io;

use async_trait::async_trait;
use serde_json::Value;

/// A backing language server as seen by the router.
///
/// Implementations own the transport (stdio, pipes, in-process). A request
/// that the server answers with `null` must be returned as `Value::Null`;
/// protocol-level error responses and I/O failures are `Err`.
#[async_trait]
pub trait LanguageServerEndpoint: Send + Sync {
    async fn send_request(&self, method: &str, params: Value) -> io::Result<Value>;

    async fn send_notification(&self, method: &str, params: Value) -> io::Result<()>;
}
