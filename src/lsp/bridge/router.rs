//! Request routing to named and content-type addressed backing servers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::endpoint::LanguageServerEndpoint;
use super::first_win::first_win;
use crate::error::{RouterError, RouterResult};

const LOG_TARGET: &str = "razor_router::router";

/// Default per-request budget for backing servers.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// A backing server known to the router.
pub struct ServerRegistration {
    name: String,
    content_types: Vec<String>,
    endpoint: Arc<dyn LanguageServerEndpoint>,
}

impl ServerRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_types(&self) -> &[String] {
        &self.content_types
    }

    pub fn serves(&self, content_type: &str) -> bool {
        self.content_types.iter().any(|ct| ct == content_type)
    }
}

impl std::fmt::Debug for ServerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistration")
            .field("name", &self.name)
            .field("content_types", &self.content_types)
            .finish_non_exhaustive()
    }
}

/// A response tagged with the server that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReinvocationResponse<R> {
    pub server_name: String,
    pub response: R,
}

/// Sends requests to backing servers.
///
/// Three shapes:
/// - targeted: one server by name ([`send`](Self::send))
/// - reinvoke-one: every server for a set of content types, first
///   non-null answer wins ([`reinvoke`](Self::reinvoke))
/// - reinvoke-all: every server for a content type, all answers
///   aggregated ([`reinvoke_all`](Self::reinvoke_all))
///
/// Cancellation yields "no result" (`Ok(None)` / empty vec), never an error.
pub struct RequestRouter {
    servers: DashMap<String, Arc<ServerRegistration>>,
    request_timeout_ms: AtomicU64,
}

impl Default for RequestRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRouter {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            servers: DashMap::new(),
            request_timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_request_timeout(&self, timeout: Duration) {
        self.request_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    /// Register (or replace) a backing server.
    pub fn register(
        &self,
        name: impl Into<String>,
        content_types: impl IntoIterator<Item = impl Into<String>>,
        endpoint: Arc<dyn LanguageServerEndpoint>,
    ) {
        let name = name.into();
        let registration = ServerRegistration {
            name: name.clone(),
            content_types: content_types.into_iter().map(Into::into).collect(),
            endpoint,
        };
        log::info!(
            target: LOG_TARGET,
            "Registered backing server {} for {:?}",
            name,
            registration.content_types
        );
        if self.servers.insert(name.clone(), Arc::new(registration)).is_some() {
            log::debug!(target: LOG_TARGET, "Replaced previous registration of {}", name);
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.servers.remove(name).is_some()
    }

    pub fn server(&self, name: &str) -> Option<Arc<ServerRegistration>> {
        self.servers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Servers serving any of `content_types`, ordered by name.
    pub fn servers_for(&self, content_types: &[String]) -> Vec<Arc<ServerRegistration>> {
        let mut servers: Vec<_> = self
            .servers
            .iter()
            .filter(|entry| content_types.iter().any(|ct| entry.value().serves(ct)))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }

    /// Targeted request to one named server.
    ///
    /// `Ok(None)` when the server answers `null` or the request is cancelled.
    pub async fn send<P, R>(
        &self,
        method: &str,
        server_name: &str,
        params: &P,
        cancel: &CancellationToken,
    ) -> RouterResult<Option<R>>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let registration = self
            .server(server_name)
            .ok_or_else(|| RouterError::server_not_found(server_name))?;
        let params = encode_params(method, params)?;
        let timeout = self.request_timeout();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!(target: LOG_TARGET, "{} to {} cancelled", method, server_name);
                Ok(None)
            }
            response = dispatch(Arc::clone(&registration), method.to_string(), params, timeout) => {
                decode(registration.name(), method, response?)
            }
        }
    }

    /// Reinvoke-one: the first non-null response among the servers for
    /// `content_types`, tagged with the answering server.
    pub async fn reinvoke<P, R>(
        &self,
        method: &str,
        content_types: &[String],
        params: &P,
        cancel: &CancellationToken,
    ) -> RouterResult<Option<ReinvocationResponse<R>>>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let servers = self.servers_for(content_types);
        if servers.is_empty() {
            log::debug!(
                target: LOG_TARGET,
                "No backing server for {:?}; {} not dispatched",
                content_types,
                method
            );
            return Ok(None);
        }
        let params = encode_params(method, params)?;
        let mut join_set = self.spawn_all::<R>(servers, method, params);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!(target: LOG_TARGET, "{} cancelled", method);
                Ok(None)
            }
            winner = first_win(&mut join_set, Option::is_some) => winner.map(Option::flatten),
        }
    }

    /// Reinvoke-all: every server for `content_type`, every non-null response.
    ///
    /// Failing servers are skipped; only when every server fails is the
    /// first failure returned.
    pub async fn reinvoke_all<P, R>(
        &self,
        method: &str,
        content_type: &str,
        params: &P,
        cancel: &CancellationToken,
    ) -> RouterResult<Vec<ReinvocationResponse<R>>>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let servers = self.servers_for(&[content_type.to_string()]);
        if servers.is_empty() {
            return Ok(Vec::new());
        }
        let params = encode_params(method, params)?;
        let mut join_set = self.spawn_all::<R>(servers, method, params);

        let aggregate = async {
            let mut responses = Vec::new();
            let mut answered = false;
            let mut first_error = None;
            while let Some(result) = join_set.join_next().await {
                match result {
                    Ok(Ok(Some(response))) => responses.push(response),
                    Ok(Ok(None)) => answered = true,
                    Ok(Err(err)) => {
                        log::warn!(target: LOG_TARGET, "{} failed: {}", method, err);
                        first_error.get_or_insert(err);
                    }
                    Err(join_error) => {
                        log::warn!(target: LOG_TARGET, "{} task failed: {}", method, join_error);
                    }
                }
            }
            match first_error {
                Some(err) if responses.is_empty() && !answered => Err(err),
                _ => Ok(responses),
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(Vec::new()),
            responses = aggregate => {
                let mut responses = responses?;
                responses.sort_by(|a: &ReinvocationResponse<R>, b| a.server_name.cmp(&b.server_name));
                Ok(responses)
            }
        }
    }

    /// Forward a notification to every server for `content_types`.
    ///
    /// Notifications are fire-and-forget; failures are logged.
    pub async fn notify<P>(&self, content_types: &[String], method: &str, params: &P)
    where
        P: Serialize + ?Sized,
    {
        let params = match encode_params(method, params) {
            Ok(params) => params,
            Err(err) => {
                log::warn!(target: LOG_TARGET, "{}", err);
                return;
            }
        };
        for server in self.servers_for(content_types) {
            if let Err(err) = server.endpoint.send_notification(method, params.clone()).await {
                log::warn!(
                    target: LOG_TARGET,
                    "Failed to send {} to {}: {}",
                    method,
                    server.name(),
                    err
                );
            }
        }
    }

    fn spawn_all<R>(
        &self,
        servers: Vec<Arc<ServerRegistration>>,
        method: &str,
        params: Value,
    ) -> JoinSet<RouterResult<Option<ReinvocationResponse<R>>>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let timeout = self.request_timeout();
        let mut join_set = JoinSet::new();
        for server in servers {
            let method = method.to_string();
            let params = params.clone();
            join_set.spawn(async move {
                let response = dispatch(Arc::clone(&server), method.clone(), params, timeout).await?;
                let decoded: Option<R> = decode(server.name(), &method, response)?;
                Ok(decoded.map(|response| ReinvocationResponse {
                    server_name: server.name().to_string(),
                    response,
                }))
            });
        }
        join_set
    }
}

fn encode_params<P: Serialize + ?Sized>(method: &str, params: &P) -> RouterResult<Value> {
    serde_json::to_value(params)
        .map_err(|err| RouterError::internal(format!("failed to encode {} params: {}", method, err)))
}

async fn dispatch(
    server: Arc<ServerRegistration>,
    method: String,
    params: Value,
    timeout: Duration,
) -> RouterResult<Value> {
    log::debug!(target: LOG_TARGET, "-> {} {}", server.name(), method);
    let outcome = tokio::time::timeout(timeout, server.endpoint.send_request(&method, params)).await;
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(RouterError::transport(server.name(), method, err.to_string())),
        Err(_) => Err(RouterError::Timeout {
            server: server.name().to_string(),
            method,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

fn decode<R: DeserializeOwned>(server: &str, method: &str, value: Value) -> RouterResult<Option<R>> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| RouterError::InvalidResponse {
            server: server.to_string(),
            method: method.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::io;
    use std::sync::Mutex;

    /// Endpoint answering every request with a fixed value after a delay.
    struct FixedEndpoint {
        answer: Option<Value>,
        delay: Duration,
        notifications: Mutex<Vec<String>>,
    }

    impl FixedEndpoint {
        fn answering(answer: Value) -> Arc<Self> {
            Self::delayed(answer, Duration::ZERO)
        }

        fn delayed(answer: Value, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                answer: Some(answer),
                delay,
                notifications: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                answer: None,
                delay: Duration::ZERO,
                notifications: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageServerEndpoint for FixedEndpoint {
        async fn send_request(&self, _method: &str, _params: Value) -> io::Result<Value> {
            tokio::time::sleep(self.delay).await;
            self.answer
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "server exited"))
        }

        async fn send_notification(&self, method: &str, _params: Value) -> io::Result<()> {
            self.notifications.lock().unwrap().push(method.to_string());
            Ok(())
        }
    }

    fn content_types(types: &[&str]) -> Vec<String> {
        types.iter().map(|t| t.to_string()).collect()
    }

    // ==========================================================================
    // Targeted
    // ==========================================================================

    #[tokio::test]
    async fn send_decodes_the_named_servers_response() {
        let router = RequestRouter::new();
        router.register("roslyn", ["csharp"], FixedEndpoint::answering(json!({"value": 1})));

        let response: Option<Value> = router
            .send("custom/method", "roslyn", &json!({}), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response, Some(json!({"value": 1})));
    }

    #[tokio::test]
    async fn send_to_unknown_server_is_an_error() {
        let router = RequestRouter::new();
        let result: RouterResult<Option<Value>> = router
            .send("custom/method", "nobody", &json!({}), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(RouterError::ServerNotFound { .. })));
    }

    #[tokio::test]
    async fn null_response_is_no_result() {
        let router = RequestRouter::new();
        router.register("html", ["html"], FixedEndpoint::answering(Value::Null));

        let response: Option<Value> = router
            .send("textDocument/hover", "html", &json!({}), &CancellationToken::new())
            .await
            .unwrap();

        assert!(response.is_none());
    }

    #[tokio::test]
    async fn undecodable_response_is_invalid_response() {
        let router = RequestRouter::new();
        router.register("html", ["html"], FixedEndpoint::answering(json!("not a number")));

        let result: RouterResult<Option<u32>> = router
            .send("custom/method", "html", &json!({}), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RouterError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn slow_server_times_out_as_transport_failure() {
        let router = RequestRouter::with_timeout(Duration::from_millis(20));
        router.register(
            "roslyn",
            ["csharp"],
            FixedEndpoint::delayed(json!(1), Duration::from_secs(5)),
        );

        let result: RouterResult<Option<Value>> = router
            .send("textDocument/hover", "roslyn", &json!({}), &CancellationToken::new())
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RouterError::Timeout { timeout_ms: 20, .. }));
        assert!(err.is_transport_failure());
    }

    #[tokio::test]
    async fn cancelled_send_is_no_result() {
        let router = RequestRouter::new();
        router.register(
            "roslyn",
            ["csharp"],
            FixedEndpoint::delayed(json!(1), Duration::from_secs(5)),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Option<Value> = router
            .send("textDocument/hover", "roslyn", &json!({}), &cancel)
            .await
            .unwrap();

        assert!(result.is_none());
    }

    // ==========================================================================
    // Reinvoke-one
    // ==========================================================================

    #[tokio::test]
    async fn reinvoke_returns_first_non_null_and_names_the_server() {
        let router = RequestRouter::new();
        router.register("html-a", ["html"], FixedEndpoint::answering(Value::Null));
        router.register(
            "html-b",
            ["html"],
            FixedEndpoint::delayed(json!("answer"), Duration::from_millis(10)),
        );

        let response: ReinvocationResponse<String> = router
            .reinvoke("textDocument/hover", &content_types(&["html"]), &json!({}), &CancellationToken::new())
            .await
            .unwrap()
            .expect("one server answered");

        assert_eq!(response.server_name, "html-b");
        assert_eq!(response.response, "answer");
    }

    #[tokio::test]
    async fn reinvoke_with_no_servers_is_no_result() {
        let router = RequestRouter::new();
        let response: Option<ReinvocationResponse<Value>> = router
            .reinvoke("textDocument/hover", &content_types(&["csharp"]), &json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn reinvoke_propagates_transport_failure_of_the_only_server() {
        let router = RequestRouter::new();
        router.register("roslyn", ["csharp"], FixedEndpoint::failing());

        let result: RouterResult<Option<ReinvocationResponse<Value>>> = router
            .reinvoke("textDocument/hover", &content_types(&["csharp"]), &json!({}), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(RouterError::Transport { .. })));
    }

    #[tokio::test]
    async fn reinvoke_ignores_servers_for_other_content_types() {
        let router = RequestRouter::new();
        router.register("roslyn", ["csharp"], FixedEndpoint::answering(json!("csharp")));
        router.register("html", ["html"], FixedEndpoint::answering(json!("html")));

        let response: ReinvocationResponse<String> = router
            .reinvoke("textDocument/hover", &content_types(&["html"]), &json!({}), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.response, "html");
    }

    // ==========================================================================
    // Reinvoke-all
    // ==========================================================================

    #[tokio::test]
    async fn reinvoke_all_aggregates_every_answer() {
        let router = RequestRouter::new();
        router.register("roslyn", ["csharp"], FixedEndpoint::answering(json!(1)));
        router.register("analyzers", ["csharp"], FixedEndpoint::answering(json!(2)));
        router.register("broken", ["csharp"], FixedEndpoint::failing());

        let responses: Vec<ReinvocationResponse<u32>> = router
            .reinvoke_all("textDocument/diagnostic", "csharp", &json!({}), &CancellationToken::new())
            .await
            .unwrap();

        let names: Vec<_> = responses.iter().map(|r| r.server_name.as_str()).collect();
        assert_eq!(names, ["analyzers", "roslyn"]);
    }

    #[tokio::test]
    async fn reinvoke_all_fails_only_when_every_server_fails() {
        let router = RequestRouter::new();
        router.register("broken", ["csharp"], FixedEndpoint::failing());

        let result: RouterResult<Vec<ReinvocationResponse<u32>>> = router
            .reinvoke_all("textDocument/diagnostic", "csharp", &json!({}), &CancellationToken::new())
            .await;

        assert!(result.is_err());
    }

    // ==========================================================================
    // Notifications
    // ==========================================================================

    #[tokio::test]
    async fn notify_reaches_every_server_for_the_content_type() {
        let router = RequestRouter::new();
        let html = FixedEndpoint::answering(Value::Null);
        let csharp = FixedEndpoint::answering(Value::Null);
        router.register("html", ["html"], html.clone());
        router.register("roslyn", ["csharp"], csharp.clone());

        router
            .notify(&content_types(&["html"]), "textDocument/didOpen", &json!({}))
            .await;

        assert_eq!(*html.notifications.lock().unwrap(), ["textDocument/didOpen"]);
        assert!(csharp.notifications.lock().unwrap().is_empty());
    }
}
