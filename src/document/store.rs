//! The central store for host documents and their virtual projections.
//!
//! Every host document owns one virtual snapshot per embedded language. A
//! virtual snapshot is published through a `tokio::sync::watch` channel so
//! that the synchronizer can wait for regenerations without polling. Readers
//! take cloned snapshots and never hold a map guard across an await.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_lsp_server::ls_types::TextDocumentContentChangeEvent;
use url::Url;

use super::position::PositionMapper;
use super::{LanguageKind, VirtualDocumentUri};
use crate::error::{RouterError, RouterResult};

const LOG_TARGET: &str = "razor_router::store";

/// Immutable view of a virtual document at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDocumentSnapshot {
    uri: VirtualDocumentUri,
    version: i32,
    host_document_version: Option<i32>,
    text: Arc<str>,
}

impl VirtualDocumentSnapshot {
    fn empty(uri: VirtualDocumentUri) -> Self {
        Self {
            uri,
            version: 0,
            host_document_version: None,
            text: Arc::from(""),
        }
    }

    /// The virtual document URI.
    pub fn uri(&self) -> &Url {
        self.uri.as_url()
    }

    /// The structured virtual URI (host + kind).
    pub fn virtual_uri(&self) -> &VirtualDocumentUri {
        &self.uri
    }

    /// The host document URI.
    pub fn host_uri(&self) -> &Url {
        self.uri.host_uri()
    }

    /// The embedded language of this document.
    pub fn kind(&self) -> LanguageKind {
        self.uri.kind()
    }

    /// The virtual document's own version. Zero until first generated.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Host version this snapshot was generated from, if any.
    pub fn host_document_version(&self) -> Option<i32> {
        self.host_document_version
    }

    /// The generated text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this snapshot reflects host edits up to `host_version`.
    pub fn is_synchronized_with(&self, host_version: i32) -> bool {
        self.host_document_version
            .is_some_and(|generated_from| generated_from >= host_version)
    }
}

/// Immutable view of a host document and its virtual documents.
#[derive(Debug, Clone)]
pub struct HostDocumentSnapshot {
    uri: Url,
    version: i32,
    text: Arc<str>,
    virtual_documents: Vec<VirtualDocumentSnapshot>,
}

impl HostDocumentSnapshot {
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// All virtual documents, in `LanguageKind::EMBEDDED` order.
    pub fn virtual_documents(&self) -> &[VirtualDocumentSnapshot] {
        &self.virtual_documents
    }

    /// The virtual document for one embedded language.
    pub fn virtual_document(&self, kind: LanguageKind) -> Option<&VirtualDocumentSnapshot> {
        self.virtual_documents.iter().find(|doc| doc.kind() == kind)
    }
}

/// One replacement in a virtual document, in byte offsets of the previous text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualTextChange {
    pub span_start: usize,
    pub span_length: usize,
    pub new_text: String,
}

/// A regeneration of one virtual document produced from a host version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualDocumentUpdate {
    pub host_document_uri: Url,
    pub kind: LanguageKind,
    pub host_document_version: i32,
    #[serde(default)]
    pub changes: Vec<VirtualTextChange>,
}

struct HostEntry {
    version: i32,
    text: Arc<str>,
    virtual_documents: HashMap<LanguageKind, watch::Sender<VirtualDocumentSnapshot>>,
}

impl HostEntry {
    fn snapshot(&self, uri: &Url) -> HostDocumentSnapshot {
        let virtual_documents = LanguageKind::EMBEDDED
            .iter()
            .filter_map(|kind| self.virtual_documents.get(kind))
            .map(|sender| sender.borrow().clone())
            .collect();
        HostDocumentSnapshot {
            uri: uri.clone(),
            version: self.version,
            text: Arc::clone(&self.text),
            virtual_documents,
        }
    }
}

/// Holds every open host document and its virtual documents.
///
/// Written by exactly one pipeline per host document (editor edits and
/// regenerations), read concurrently by request handlers.
#[derive(Default)]
pub struct VirtualDocumentStore {
    documents: DashMap<Url, HostEntry>,
    /// Reverse index: virtual URI -> (host URI, kind)
    virtual_index: DashMap<Url, (Url, LanguageKind)>,
}

impl VirtualDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reopen) a host document.
    ///
    /// Virtual documents start empty at version 0 and are not synchronized
    /// with any host version until the first regeneration arrives.
    pub fn open(&self, uri: Url, version: i32, text: impl Into<Arc<str>>) -> HostDocumentSnapshot {
        self.close(&uri);

        let mut virtual_documents = HashMap::new();
        for kind in LanguageKind::EMBEDDED {
            let Some(virtual_uri) = VirtualDocumentUri::new(&uri, kind) else {
                log::warn!(
                    target: LOG_TARGET,
                    "Cannot derive {} virtual document URI for {}",
                    kind,
                    uri
                );
                continue;
            };
            self.virtual_index
                .insert(virtual_uri.as_url().clone(), (uri.clone(), kind));
            let (sender, _) = watch::channel(VirtualDocumentSnapshot::empty(virtual_uri));
            virtual_documents.insert(kind, sender);
        }

        let entry = HostEntry {
            version,
            text: text.into(),
            virtual_documents,
        };
        let snapshot = entry.snapshot(&uri);
        self.documents.insert(uri, entry);
        snapshot
    }

    /// Apply editor changes to a host document.
    ///
    /// `version` must be strictly greater than the current version; anything
    /// else is rejected and the document is left unchanged.
    pub fn apply_host_changes(
        &self,
        uri: &Url,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> RouterResult<HostDocumentSnapshot> {
        let mut entry = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| RouterError::document_not_found(uri.as_str()))?;

        if version <= entry.version {
            return Err(RouterError::invalid_edit(format!(
                "version {} is not newer than {} for {}",
                version, entry.version, uri
            )));
        }

        let mut text = entry.text.to_string();
        for change in changes {
            match change.range {
                None => text = change.text.clone(),
                Some(range) => {
                    let (start, end) = PositionMapper::new(&text)
                        .range_to_bytes(range)
                        .ok_or_else(|| {
                            RouterError::invalid_edit(format!(
                                "range {:?} is outside of {}",
                                range, uri
                            ))
                        })?;
                    text.replace_range(start..end, &change.text);
                }
            }
        }

        entry.version = version;
        entry.text = Arc::from(text);
        Ok(entry.snapshot(uri))
    }

    /// Apply a regeneration to one virtual document and notify waiters.
    ///
    /// Returns `Ok(None)` when the update was produced from a host version
    /// older than the one already reflected (the update is ignored).
    pub fn update_virtual_document(
        &self,
        update: &VirtualDocumentUpdate,
    ) -> RouterResult<Option<VirtualDocumentSnapshot>> {
        let uri = &update.host_document_uri;
        let entry = self
            .documents
            .get(uri)
            .ok_or_else(|| RouterError::document_not_found(uri.as_str()))?;
        let sender = entry.virtual_documents.get(&update.kind).ok_or_else(|| {
            RouterError::document_not_found(format!("{} ({})", uri, update.kind))
        })?;

        let current = sender.borrow().clone();
        if current
            .host_document_version
            .is_some_and(|known| update.host_document_version < known)
        {
            log::debug!(
                target: LOG_TARGET,
                "Ignoring {} regeneration for {} from host version {} (already at {:?})",
                update.kind,
                uri,
                update.host_document_version,
                current.host_document_version
            );
            return Ok(None);
        }
        if update.host_document_version > entry.version {
            log::debug!(
                target: LOG_TARGET,
                "{} regeneration for {} is ahead of the host ({} > {})",
                update.kind,
                uri,
                update.host_document_version,
                entry.version
            );
        }

        let text = apply_virtual_changes(current.text(), &update.changes)?;
        let next = VirtualDocumentSnapshot {
            uri: current.uri.clone(),
            version: current.version + 1,
            host_document_version: Some(update.host_document_version),
            text: Arc::from(text),
        };
        sender.send_replace(next.clone());
        Ok(Some(next))
    }

    /// Remove a host document and its virtual documents.
    ///
    /// Dropping the watch senders wakes every pending synchronization.
    pub fn close(&self, uri: &Url) -> Option<HostDocumentSnapshot> {
        let (uri, entry) = self.documents.remove(uri)?;
        let snapshot = entry.snapshot(&uri);
        for doc in snapshot.virtual_documents() {
            self.virtual_index.remove(doc.uri());
        }
        Some(snapshot)
    }

    /// Current snapshot of a host document.
    pub fn get(&self, uri: &Url) -> Option<HostDocumentSnapshot> {
        self.documents.get(uri).map(|entry| entry.snapshot(uri))
    }

    /// Current version of a host document.
    pub fn host_version(&self, uri: &Url) -> Option<i32> {
        self.documents.get(uri).map(|entry| entry.version)
    }

    /// Current snapshot of one virtual document.
    pub fn virtual_document(&self, uri: &Url, kind: LanguageKind) -> Option<VirtualDocumentSnapshot> {
        let entry = self.documents.get(uri)?;
        let sender = entry.virtual_documents.get(&kind)?;
        let snapshot = sender.borrow().clone();
        Some(snapshot)
    }

    /// Subscribe to regenerations of one virtual document.
    pub fn subscribe(
        &self,
        uri: &Url,
        kind: LanguageKind,
    ) -> Option<watch::Receiver<VirtualDocumentSnapshot>> {
        let entry = self.documents.get(uri)?;
        entry.virtual_documents.get(&kind).map(watch::Sender::subscribe)
    }

    /// Resolve a virtual document URI back to its host and language.
    pub fn resolve_virtual_uri(&self, virtual_uri: &Url) -> Option<(Url, LanguageKind)> {
        self.virtual_index
            .get(virtual_uri)
            .map(|entry| entry.value().clone())
    }

    /// Number of open host documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Apply non-overlapping byte-offset changes to `text`, highest offset first.
fn apply_virtual_changes(text: &str, changes: &[VirtualTextChange]) -> RouterResult<String> {
    let mut ordered: Vec<&VirtualTextChange> = changes.iter().collect();
    ordered.sort_by(|a, b| b.span_start.cmp(&a.span_start));

    let mut result = text.to_string();
    let mut upper_bound = text.len();
    for change in ordered {
        let start = change.span_start;
        let end = start
            .checked_add(change.span_length)
            .ok_or_else(|| RouterError::invalid_edit("span length overflows"))?;
        if end > upper_bound {
            return Err(RouterError::invalid_edit(format!(
                "change {}..{} overlaps or exceeds {}",
                start, end, upper_bound
            )));
        }
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return Err(RouterError::invalid_edit(format!(
                "change {}..{} splits a character",
                start, end
            )));
        }
        result.replace_range(start..end, &change.new_text);
        upper_bound = start;
    }
    Ok(result)
}
