//! Waiting for virtual documents to catch up with host edits.
//!
//! Virtual documents are regenerated asynchronously after every host edit. A
//! request issued right after a keystroke must not be answered against the
//! pre-edit projection, so handlers first wait here until the virtual
//! document reflects the host version they observed.
//!
//! # Coalescing
//!
//! Regenerations are published through a watch channel, which only keeps the
//! latest snapshot: any number of waiters share one notification and rapid
//! edits collapse into the newest state. When several requests wait on the
//! same virtual document for different host versions, the older ones are
//! rejected as soon as a newer one registers (they would be answered against
//! content the user has already changed).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::store::{VirtualDocumentSnapshot, VirtualDocumentStore};
use super::LanguageKind;

/// Default time budget for a virtual document to catch up.
pub const DEFAULT_SYNCHRONIZATION_TIMEOUT: Duration = Duration::from_millis(2000);

const LOG_TARGET: &str = "razor_router::sync";

pub struct DocumentSynchronizer {
    store: Arc<VirtualDocumentStore>,
    timeout_ms: AtomicU64,
    reject_on_newer_parallel_request: AtomicBool,
    /// Latest host version requested per virtual document URI.
    latest_requests: DashMap<Url, watch::Sender<i32>>,
}

impl DocumentSynchronizer {
    pub fn new(store: Arc<VirtualDocumentStore>) -> Self {
        Self::with_timeout(store, DEFAULT_SYNCHRONIZATION_TIMEOUT)
    }

    pub fn with_timeout(store: Arc<VirtualDocumentStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
            reject_on_newer_parallel_request: AtomicBool::new(true),
            latest_requests: DashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether an older pending wait gives up when a newer one registers.
    pub fn set_reject_on_newer_parallel_request(&self, reject: bool) {
        self.reject_on_newer_parallel_request
            .store(reject, Ordering::Relaxed);
    }

    /// Wait until `virtual_document` reflects `expected_host_version`.
    ///
    /// Returns false on timeout, cancellation, document close, or when a
    /// request for a newer host version supersedes this one.
    pub async fn synchronize(
        &self,
        expected_host_version: i32,
        virtual_document: &VirtualDocumentSnapshot,
        cancel: &CancellationToken,
    ) -> bool {
        self.synchronize_snapshot(expected_host_version, virtual_document, cancel)
            .await
            .is_some()
    }

    /// Like [`synchronize`](Self::synchronize), returning the synchronized snapshot.
    pub async fn synchronize_snapshot(
        &self,
        expected_host_version: i32,
        virtual_document: &VirtualDocumentSnapshot,
        cancel: &CancellationToken,
    ) -> Option<VirtualDocumentSnapshot> {
        if virtual_document.is_synchronized_with(expected_host_version) {
            return Some(virtual_document.clone());
        }

        let host_uri = virtual_document.host_uri();
        let kind = virtual_document.kind();
        let Some(mut regenerations) = self.store.subscribe(host_uri, kind) else {
            log::debug!(
                target: LOG_TARGET,
                "{} virtual document for {} is gone; cannot synchronize",
                kind,
                host_uri
            );
            return None;
        };
        let mut newer_requests = self.register_request(virtual_document.uri(), expected_host_version);
        let reject_on_newer = self.reject_on_newer_parallel_request.load(Ordering::Relaxed);
        let timeout = self.timeout();

        let caught_up = async {
            regenerations
                .wait_for(|doc| doc.is_synchronized_with(expected_host_version))
                .await
                .map(|doc| (*doc).clone())
                .ok()
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!(target: LOG_TARGET, "Synchronization of {} for {} cancelled", kind, host_uri);
                None
            }
            _ = newer_requests.wait_for(|latest| *latest > expected_host_version), if reject_on_newer => {
                log::debug!(
                    target: LOG_TARGET,
                    "Synchronization of {} for {} to version {} superseded by a newer request",
                    kind,
                    host_uri,
                    expected_host_version
                );
                None
            }
            result = tokio::time::timeout(timeout, caught_up) => match result {
                Ok(Some(snapshot)) => Some(snapshot),
                Ok(None) => {
                    log::debug!(target: LOG_TARGET, "{} for {} closed while synchronizing", kind, host_uri);
                    None
                }
                Err(_) => {
                    log::warn!(
                        target: LOG_TARGET,
                        "Timed out after {:?} waiting for {} of {} to reach host version {}",
                        timeout,
                        kind,
                        host_uri,
                        expected_host_version
                    );
                    None
                }
            },
        }
    }

    fn register_request(&self, virtual_uri: &Url, host_version: i32) -> watch::Receiver<i32> {
        let entry = self
            .latest_requests
            .entry(virtual_uri.clone())
            .or_insert_with(|| watch::channel(host_version).0);
        entry.send_if_modified(|latest| {
            if host_version > *latest {
                *latest = host_version;
                true
            } else {
                false
            }
        });
        entry.subscribe()
    }

    /// Drop bookkeeping for a closed host document.
    pub fn forget(&self, host_uri: &Url) {
        for kind in LanguageKind::EMBEDDED {
            if let Some(uri) = super::VirtualDocumentUri::new(host_uri, kind) {
                self.latest_requests.remove(uri.as_url());
            }
        }
    }
}
