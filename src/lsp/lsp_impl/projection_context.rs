//! Shared preamble for position-based handlers.
//!
//! Every position-based handler (completion, hover, definition, references,
//! rename, document highlight, on-type formatting, linked editing) starts
//! the same way: convert the URI, take a host snapshot, classify and project
//! the position, and pick the content types to dispatch to. This module
//! extracts that preamble.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::{Position, Uri};
use url::Url;

use crate::document::{HostDocumentSnapshot, LanguageKind};
use crate::error::RouterResult;
use crate::lsp::projection::ProjectionResult;

use super::{RazorRouter, uri_to_url, url_to_uri};

/// Everything a handler needs to dispatch into a virtual document.
pub(crate) struct ProjectionContext {
    /// The host document URL.
    pub(crate) host_uri: Url,
    /// Host snapshot the request was issued against.
    pub(crate) host: HostDocumentSnapshot,
    /// Position as the editor sent it.
    pub(crate) host_position: Position,
    pub(crate) projection: ProjectionResult,
    /// The projected virtual document, as an LSP URI.
    pub(crate) projected_uri: Uri,
    /// Content types of the servers to dispatch to.
    pub(crate) content_types: Vec<String>,
}

impl ProjectionContext {
    pub(crate) fn kind(&self) -> LanguageKind {
        self.projection.kind
    }

    /// Host version every mapped result must have been computed against.
    pub(crate) fn expected_host_version(&self) -> i32 {
        self.projection.host_document_version
    }
}

impl RazorRouter {
    /// Convert `lsp_uri` and take the current host snapshot.
    ///
    /// `None` for invalid URIs and documents that are not open.
    pub(crate) fn host_snapshot(
        &self,
        lsp_uri: &Uri,
        method_name: &str,
    ) -> Option<(Url, HostDocumentSnapshot)> {
        let Ok(uri) = uri_to_url(lsp_uri) else {
            log::warn!("Invalid URI in {}: {}", method_name, lsp_uri.as_str());
            return None;
        };
        let Some(host) = self.store.get(&uri) else {
            log::debug!(target: "razor_router::router", "{}: {} is not open", method_name, uri);
            return None;
        };
        Some((uri, host))
    }

    /// Shared preamble for position-based handlers.
    ///
    /// Returns `Ok(None)` for every early-exit condition (invalid URI, no
    /// document, Razor position, failed synchronization, cancellation).
    /// Classification transport failures propagate.
    pub(crate) async fn resolve_projection(
        &self,
        lsp_uri: &Uri,
        position: Position,
        method_name: &str,
        cancel: &CancellationToken,
    ) -> RouterResult<Option<ProjectionContext>> {
        let Some((host_uri, host)) = self.host_snapshot(lsp_uri, method_name) else {
            return Ok(None);
        };

        log::debug!(
            target: "razor_router::router",
            "{} called for {} at line {} col {} (version {})",
            method_name,
            host_uri,
            position.line,
            position.character,
            host.version()
        );

        let Some(projection) = self.projection.project(&host, position, cancel).await? else {
            return Ok(None);
        };

        let content_types = self.content_types_for(projection.kind);
        let projected_uri = url_to_uri(&projection.uri)?;

        Ok(Some(ProjectionContext {
            host_uri,
            host,
            host_position: position,
            projection,
            projected_uri,
            content_types,
        }))
    }
}
