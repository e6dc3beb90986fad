//! Mapping of virtual-document results back into host coordinates.
//!
//! The Razor mapping service does the actual transform. This module owns the
//! validation discipline: every mapping is stamped with the host version it
//! was computed against, and anything not computed against the currently
//! open version is dropped instead of applied.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::{
    AnnotatedTextEdit, DocumentChangeOperation, DocumentChanges, FormattingOptions, Location,
    LocationLink, OneOf, OptionalVersionedTextDocumentIdentifier, Range, TextDocumentEdit, TextEdit,
    Uri, WorkspaceEdit,
};
use url::Url;

use super::lsp_impl::{uri_to_url, url_to_uri};
use crate::document::{LanguageKind, VirtualDocumentStore, VirtualDocumentUri};
use crate::error::RouterResult;

const LOG_TARGET: &str = "razor_router::mapping";

/// Ranges mapped by the mapping service, index-aligned with the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedRanges {
    /// `None` where a range could not be mapped.
    pub ranges: Vec<Option<Range>>,
    #[serde(default)]
    pub host_document_version: Option<i32>,
}

/// Edits remapped by the mapping service; may be fewer than requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemappedEdits {
    pub edits: Vec<TextEdit>,
    #[serde(default)]
    pub host_document_version: Option<i32>,
}

/// The Razor range-mapping endpoint.
#[async_trait]
pub trait DocumentMappingService: Send + Sync {
    /// Map ranges of the `kind` virtual document of `host_uri` to the host.
    ///
    /// `Ok(None)` when nothing could be mapped.
    async fn map_to_host_ranges(
        &self,
        kind: LanguageKind,
        host_uri: &Url,
        ranges: &[Range],
    ) -> RouterResult<Option<MappedRanges>>;

    async fn remap_text_edits(
        &self,
        kind: LanguageKind,
        host_uri: &Url,
        edits: &[TextEdit],
        formatting_options: Option<&FormattingOptions>,
        contains_snippet: bool,
    ) -> RouterResult<Option<RemappedEdits>>;
}

/// Ranges validated against the host version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRanges {
    pub ranges: Vec<Option<Range>>,
    pub host_document_version: i32,
}

pub struct CoordinateMapper {
    service: Arc<dyn DocumentMappingService>,
    store: Arc<VirtualDocumentStore>,
}

impl CoordinateMapper {
    pub fn new(service: Arc<dyn DocumentMappingService>, store: Arc<VirtualDocumentStore>) -> Self {
        Self { service, store }
    }

    fn is_current(&self, host_uri: &Url, returned: Option<i32>, expected: i32) -> bool {
        let current = self.store.host_version(host_uri);
        let fresh = returned == Some(expected) && current == Some(expected);
        if !fresh {
            log::debug!(
                target: LOG_TARGET,
                "Discarding stale mapping for {}: mapped at {:?}, expected {}, open {:?}",
                host_uri,
                returned,
                expected,
                current
            );
        }
        fresh
    }

    /// Map `ranges` of the `kind` virtual document back to `host_uri`.
    ///
    /// `Ok(None)` when the service has no answer, the answer is stale, or
    /// the request is cancelled.
    pub async fn map_ranges(
        &self,
        kind: LanguageKind,
        host_uri: &Url,
        ranges: &[Range],
        expected_host_version: i32,
        cancel: &CancellationToken,
    ) -> RouterResult<Option<HostRanges>> {
        let mapped = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            mapped = self.service.map_to_host_ranges(kind, host_uri, ranges) => mapped?,
        };
        let Some(mapped) = mapped else {
            log::debug!(target: LOG_TARGET, "No mapping for {} ranges of {}", kind, host_uri);
            return Ok(None);
        };
        if !self.is_current(host_uri, mapped.host_document_version, expected_host_version) {
            return Ok(None);
        }
        if mapped.ranges.len() != ranges.len() {
            log::warn!(
                target: LOG_TARGET,
                "Mapping service returned {} ranges for {} requested",
                mapped.ranges.len(),
                ranges.len()
            );
            return Ok(None);
        }
        Ok(Some(HostRanges {
            ranges: mapped.ranges,
            host_document_version: expected_host_version,
        }))
    }

    /// Single-range variant of [`map_ranges`](Self::map_ranges).
    pub async fn map_range(
        &self,
        kind: LanguageKind,
        host_uri: &Url,
        range: Range,
        expected_host_version: i32,
        cancel: &CancellationToken,
    ) -> RouterResult<Option<Range>> {
        let mapped = self
            .map_ranges(kind, host_uri, &[range], expected_host_version, cancel)
            .await?;
        Ok(mapped.and_then(|mapped| mapped.ranges.into_iter().next().flatten()))
    }

    /// Remap formatting or snippet edits; stale results yield no edits.
    #[allow(clippy::too_many_arguments)]
    pub async fn remap_text_edits(
        &self,
        kind: LanguageKind,
        host_uri: &Url,
        edits: &[TextEdit],
        formatting_options: Option<&FormattingOptions>,
        contains_snippet: bool,
        expected_host_version: i32,
        cancel: &CancellationToken,
    ) -> RouterResult<Vec<TextEdit>> {
        if edits.is_empty() {
            return Ok(Vec::new());
        }
        let remapped = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Vec::new()),
            remapped = self.service.remap_text_edits(kind, host_uri, edits, formatting_options, contains_snippet) => remapped?,
        };
        let Some(remapped) = remapped else {
            return Ok(Vec::new());
        };
        if !self.is_current(host_uri, remapped.host_document_version, expected_host_version) {
            return Ok(Vec::new());
        }
        Ok(remapped.edits)
    }

    /// Map ranges of a virtual document identified by its own URI.
    ///
    /// Returns the host URI alongside the mapped ranges.
    async fn map_virtual_ranges(
        &self,
        virtual_uri: &Url,
        ranges: &[Range],
        cancel: &CancellationToken,
    ) -> RouterResult<Option<(Url, HostRanges)>> {
        let Some((host_uri, kind)) = self.store.resolve_virtual_uri(virtual_uri) else {
            log::debug!(target: LOG_TARGET, "{} is not an open virtual document", virtual_uri);
            return Ok(None);
        };
        let Some(expected) = self.store.host_version(&host_uri) else {
            return Ok(None);
        };
        let mapped = self
            .map_ranges(kind, &host_uri, ranges, expected, cancel)
            .await?;
        Ok(mapped.map(|mapped| (host_uri, mapped)))
    }

    /// Map locations inside virtual documents onto their hosts.
    ///
    /// Unmappable or stale locations are dropped; locations in ordinary
    /// documents pass through unchanged. Order is preserved.
    pub async fn remap_locations(
        &self,
        locations: Vec<Location>,
        cancel: &CancellationToken,
    ) -> RouterResult<Vec<Location>> {
        let mut slots: Vec<Option<Location>> = Vec::with_capacity(locations.len());
        let mut groups: Vec<(Url, Vec<usize>)> = Vec::new();

        for (index, location) in locations.into_iter().enumerate() {
            match classify_uri(&location.uri) {
                UriKind::Virtual(url) => {
                    match groups.iter_mut().find(|(uri, _)| *uri == url) {
                        Some((_, indices)) => indices.push(index),
                        None => groups.push((url, vec![index])),
                    }
                    slots.push(Some(location));
                }
                UriKind::Ordinary => slots.push(Some(location)),
            }
        }

        for (virtual_uri, indices) in groups {
            let ranges: Vec<Range> = indices
                .iter()
                .filter_map(|&i| slots[i].as_ref().map(|location| location.range))
                .collect();
            let mapped = self.map_virtual_ranges(&virtual_uri, &ranges, cancel).await?;
            let host = mapped.and_then(|(host_uri, mapped)| {
                url_to_uri(&host_uri).ok().map(|uri| (uri, mapped.ranges))
            });
            match host {
                Some((host_uri, ranges)) => {
                    for (&index, range) in indices.iter().zip(ranges) {
                        slots[index] = range.map(|range| Location {
                            uri: host_uri.clone(),
                            range,
                        });
                    }
                }
                None => {
                    for &index in &indices {
                        slots[index] = None;
                    }
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Map location links whose targets live in virtual documents.
    ///
    /// The origin selection range belongs to the requesting host document
    /// and is left as is.
    pub async fn remap_location_links(
        &self,
        links: Vec<LocationLink>,
        cancel: &CancellationToken,
    ) -> RouterResult<Vec<LocationLink>> {
        let mut remapped = Vec::with_capacity(links.len());
        for link in links {
            let UriKind::Virtual(virtual_uri) = classify_uri(&link.target_uri) else {
                remapped.push(link);
                continue;
            };
            let ranges = [link.target_range, link.target_selection_range];
            let Some((host_uri, mapped)) =
                self.map_virtual_ranges(&virtual_uri, &ranges, cancel).await?
            else {
                continue;
            };
            let (Some(target_range), Some(target_selection_range)) = (mapped.ranges[0], mapped.ranges[1])
            else {
                continue;
            };
            let Ok(target_uri) = url_to_uri(&host_uri) else {
                continue;
            };
            remapped.push(LocationLink {
                origin_selection_range: link.origin_selection_range,
                target_uri,
                target_range,
                target_selection_range,
            });
        }
        Ok(remapped)
    }

    /// Retarget every edit made to a virtual document onto its host.
    ///
    /// Both the `changes` and `document_changes` forms are handled. Edits
    /// that cannot be mapped are dropped; resource operations on virtual
    /// documents are dropped; other documents pass through.
    pub async fn remap_workspace_edit(
        &self,
        edit: WorkspaceEdit,
        cancel: &CancellationToken,
    ) -> RouterResult<WorkspaceEdit> {
        let changes = match edit.changes {
            Some(changes) => Some(self.remap_changes(changes, cancel).await?),
            None => None,
        };
        let document_changes = match edit.document_changes {
            Some(DocumentChanges::Edits(edits)) => {
                let mut remapped = Vec::with_capacity(edits.len());
                for document_edit in edits {
                    if let Some(document_edit) = self.remap_document_edit(document_edit, cancel).await? {
                        remapped.push(document_edit);
                    }
                }
                Some(DocumentChanges::Edits(remapped))
            }
            Some(DocumentChanges::Operations(operations)) => {
                let mut remapped = Vec::with_capacity(operations.len());
                for operation in operations {
                    match operation {
                        DocumentChangeOperation::Edit(document_edit) => {
                            if let Some(document_edit) =
                                self.remap_document_edit(document_edit, cancel).await?
                            {
                                remapped.push(DocumentChangeOperation::Edit(document_edit));
                            }
                        }
                        DocumentChangeOperation::Op(op) => {
                            if touches_virtual_document(&op) {
                                log::debug!(target: LOG_TARGET, "Dropping resource operation on a virtual document");
                            } else {
                                remapped.push(DocumentChangeOperation::Op(op));
                            }
                        }
                    }
                }
                Some(DocumentChanges::Operations(remapped))
            }
            None => None,
        };

        Ok(WorkspaceEdit {
            changes,
            document_changes,
            change_annotations: edit.change_annotations,
        })
    }

    async fn remap_changes(
        &self,
        changes: HashMap<Uri, Vec<TextEdit>>,
        cancel: &CancellationToken,
    ) -> RouterResult<HashMap<Uri, Vec<TextEdit>>> {
        let mut remapped: HashMap<Uri, Vec<TextEdit>> = HashMap::new();
        for (uri, edits) in changes {
            let UriKind::Virtual(virtual_uri) = classify_uri(&uri) else {
                remapped.entry(uri).or_default().extend(edits);
                continue;
            };
            let ranges: Vec<Range> = edits.iter().map(|edit| edit.range).collect();
            let Some((host_uri, mapped)) =
                self.map_virtual_ranges(&virtual_uri, &ranges, cancel).await?
            else {
                continue;
            };
            let Ok(host_uri) = url_to_uri(&host_uri) else {
                continue;
            };
            let host_edits = edits
                .into_iter()
                .zip(mapped.ranges)
                .filter_map(|(edit, range)| {
                    range.map(|range| TextEdit {
                        range,
                        new_text: edit.new_text,
                    })
                });
            remapped.entry(host_uri).or_default().extend(host_edits);
        }
        Ok(remapped)
    }

    async fn remap_document_edit(
        &self,
        document_edit: TextDocumentEdit,
        cancel: &CancellationToken,
    ) -> RouterResult<Option<TextDocumentEdit>> {
        let UriKind::Virtual(virtual_uri) = classify_uri(&document_edit.text_document.uri) else {
            return Ok(Some(document_edit));
        };
        let ranges: Vec<Range> = document_edit
            .edits
            .iter()
            .map(|edit| match edit {
                OneOf::Left(edit) => edit.range,
                OneOf::Right(annotated) => annotated.text_edit.range,
            })
            .collect();
        let Some((host_uri, mapped)) = self.map_virtual_ranges(&virtual_uri, &ranges, cancel).await?
        else {
            return Ok(None);
        };
        let Ok(uri) = url_to_uri(&host_uri) else {
            return Ok(None);
        };

        let edits = document_edit
            .edits
            .into_iter()
            .zip(mapped.ranges)
            .filter_map(|(edit, range)| {
                let range = range?;
                Some(match edit {
                    OneOf::Left(edit) => OneOf::Left(TextEdit {
                        range,
                        new_text: edit.new_text,
                    }),
                    OneOf::Right(annotated) => OneOf::Right(AnnotatedTextEdit {
                        text_edit: TextEdit {
                            range,
                            new_text: annotated.text_edit.new_text,
                        },
                        annotation_id: annotated.annotation_id,
                    }),
                })
            })
            .collect();

        Ok(Some(TextDocumentEdit {
            text_document: OptionalVersionedTextDocumentIdentifier {
                uri,
                version: Some(mapped.host_document_version),
            },
            edits,
        }))
    }
}

enum UriKind {
    Virtual(Url),
    Ordinary,
}

fn classify_uri(uri: &Uri) -> UriKind {
    if !VirtualDocumentUri::is_virtual_uri(uri.as_str()) {
        return UriKind::Ordinary;
    }
    match uri_to_url(uri) {
        Ok(url) => UriKind::Virtual(url),
        Err(_) => UriKind::Ordinary,
    }
}

fn touches_virtual_document(op: &tower_lsp_server::ls_types::ResourceOp) -> bool {
    use tower_lsp_server::ls_types::ResourceOp;
    match op {
        ResourceOp::Create(create) => VirtualDocumentUri::is_virtual_uri(create.uri.as_str()),
        ResourceOp::Rename(rename) => {
            VirtualDocumentUri::is_virtual_uri(rename.old_uri.as_str())
                || VirtualDocumentUri::is_virtual_uri(rename.new_uri.as_str())
        }
        ResourceOp::Delete(delete) => VirtualDocumentUri::is_virtual_uri(delete.uri.as_str()),
    }
}
