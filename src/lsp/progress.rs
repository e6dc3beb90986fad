//! Correlation of `$/progress` notifications with the requests awaiting them.
//!
//! Backing servers stream partial results (e.g. references) through
//! `$/progress` notifications tagged with the `partialResultToken` the router
//! put into the request. Each registration owns one background task that
//! feeds notifications to its callback in arrival order and resolves a
//! one-shot completion when the registration ends.
//!
//! ```text
//! register(token) ──► Listening ──deliver──► on_notify(payload) ──┐
//!                        ▲                                        │
//!                        └──────────── idle timer reset ◄─────────┘
//!                        │
//!                        ├── idle timeout ──► Completed
//!                        ├── cancellation ──► Cancelled
//!                        └── dispose()    ──► Disposed
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::{NumberOrString, ProgressToken};

const LOG_TARGET: &str = "razor_router::progress";

/// Method name of progress notifications.
pub const PROGRESS_METHOD: &str = "$/progress";

/// How a registration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressOutcome {
    /// No notification arrived within the idle timeout.
    Completed,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The correlator was disposed.
    Disposed,
}

/// Resolves once when its registration ends.
#[derive(Debug)]
pub struct ProgressCompletion {
    receiver: oneshot::Receiver<ProgressOutcome>,
}

impl ProgressCompletion {
    pub async fn wait(self) -> ProgressOutcome {
        self.receiver.await.unwrap_or(ProgressOutcome::Disposed)
    }
}

struct Registration {
    id: u64,
    sender: mpsc::UnboundedSender<Value>,
}

/// Registry of progress tokens awaiting notifications.
pub struct ProgressCorrelator {
    registrations: Arc<DashMap<ProgressToken, Registration>>,
    next_id: AtomicU64,
    disposed: CancellationToken,
}

impl Default for ProgressCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCorrelator {
    pub fn new() -> Self {
        Self {
            registrations: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            disposed: CancellationToken::new(),
        }
    }

    /// Start listening for notifications carrying `token`.
    ///
    /// Returns `None` when `token` already has a live registration. The
    /// idle timer restarts after every delivered notification.
    ///
    /// Must be called within a tokio runtime.
    pub fn register(
        &self,
        token: ProgressToken,
        on_notify: impl Fn(Value) + Send + Sync + 'static,
        idle_timeout: Duration,
        cancel: CancellationToken,
    ) -> Option<ProgressCompletion> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, mut receiver) = mpsc::unbounded_channel();

        match self.registrations.entry(token.clone()) {
            Entry::Occupied(_) => {
                log::debug!(target: LOG_TARGET, "Progress token {:?} is already registered", token);
                return None;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Registration { id, sender });
            }
        }

        let (completion_tx, completion_rx) = oneshot::channel();
        let registrations = Arc::clone(&self.registrations);
        let disposed = self.disposed.clone();

        tokio::spawn(async move {
            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = disposed.cancelled() => break ProgressOutcome::Disposed,
                    _ = cancel.cancelled() => break ProgressOutcome::Cancelled,
                    payload = receiver.recv() => match payload {
                        Some(payload) => on_notify(payload),
                        None => break ProgressOutcome::Disposed,
                    },
                    _ = tokio::time::sleep(idle_timeout) => break ProgressOutcome::Completed,
                }
            };
            // A newer registration may already own the token.
            registrations.remove_if(&token, |_, registration| registration.id == id);
            // Nothing can be delivered once unregistered; whatever was
            // accepted before that still reaches the callback.
            if outcome != ProgressOutcome::Disposed {
                while let Ok(payload) = receiver.try_recv() {
                    on_notify(payload);
                }
            }
            log::debug!(target: LOG_TARGET, "Progress token {:?} finished: {:?}", token, outcome);
            let _ = completion_tx.send(outcome);
        });

        Some(ProgressCompletion {
            receiver: completion_rx,
        })
    }

    /// Hand `payload` to the registration for `token`.
    ///
    /// Returns false when nobody is listening for the token.
    pub fn deliver(&self, token: &ProgressToken, payload: Value) -> bool {
        match self.registrations.get(token) {
            Some(registration) => registration.sender.send(payload).is_ok(),
            None => {
                log::trace!(target: LOG_TARGET, "No listener for progress token {:?}", token);
                false
            }
        }
    }

    /// Accept a raw notification; anything but a well-formed `$/progress` is ignored.
    pub fn deliver_notification(&self, method: &str, params: &Value) -> bool {
        if method != PROGRESS_METHOD {
            return false;
        }
        let Some(token) = params.get("token").and_then(parse_token) else {
            log::debug!(target: LOG_TARGET, "Ignoring $/progress without a usable token");
            return false;
        };
        let payload = params.get("value").cloned().unwrap_or(Value::Null);
        self.deliver(&token, payload)
    }

    /// Whether `token` has a live registration.
    pub fn is_registered(&self, token: &ProgressToken) -> bool {
        self.registrations.contains_key(token)
    }

    /// End every outstanding registration with [`ProgressOutcome::Disposed`].
    ///
    /// Later registrations end immediately.
    pub fn dispose(&self) {
        self.disposed.cancel();
    }
}

impl Drop for ProgressCorrelator {
    fn drop(&mut self) {
        self.disposed.cancel();
    }
}

fn parse_token(value: &Value) -> Option<ProgressToken> {
    match value {
        Value::String(token) => Some(NumberOrString::String(token.clone())),
        Value::Number(number) => number
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .map(NumberOrString::Number),
        _ => None,
    }
}
