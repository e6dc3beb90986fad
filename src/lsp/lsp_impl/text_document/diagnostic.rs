//! Pull diagnostics method for RazorRouter.
//!
//! Unlike the position-based handlers, a diagnostic pull covers every
//! virtual document of the host: each one is synchronized to the current
//! host version, every server for its content types is asked, and the
//! combined diagnostics are mapped back in one batch per virtual document.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::{
    Diagnostic, DiagnosticRelatedInformation, DocumentDiagnosticParams, DocumentDiagnosticReport,
    DocumentDiagnosticReportResult, FullDocumentDiagnosticReport, Range,
    RelatedFullDocumentDiagnosticReport, TextDocumentIdentifier,
};
use url::Url;

use crate::document::{HostDocumentSnapshot, VirtualDocumentSnapshot};
use crate::error::RouterResult;

use super::super::{RazorRouter, url_to_uri};

const LOG_TARGET: &str = "razor_router::diagnostics";

fn full_report(items: Vec<Diagnostic>) -> DocumentDiagnosticReportResult {
    DocumentDiagnosticReportResult::Report(DocumentDiagnosticReport::Full(
        RelatedFullDocumentDiagnosticReport {
            related_documents: None,
            full_document_diagnostic_report: FullDocumentDiagnosticReport {
                result_id: None,
                items,
            },
        },
    ))
}

impl RazorRouter {
    pub async fn diagnostic(
        &self,
        params: DocumentDiagnosticParams,
        cancel: &CancellationToken,
    ) -> Result<DocumentDiagnosticReportResult> {
        let Some((host_uri, host)) = self.host_snapshot(&params.text_document.uri, "diagnostic")
        else {
            return Ok(full_report(Vec::new()));
        };

        let mut items = Vec::new();
        for virtual_document in host.virtual_documents() {
            let diagnostics = self
                .virtual_document_diagnostics(&host_uri, &host, virtual_document, &params, cancel)
                .await?;
            items.extend(diagnostics);
        }
        log::debug!(
            target: LOG_TARGET,
            "{} diagnostics for {} (version {})",
            items.len(),
            host_uri,
            host.version()
        );
        Ok(full_report(items))
    }

    async fn virtual_document_diagnostics(
        &self,
        host_uri: &Url,
        host: &HostDocumentSnapshot,
        virtual_document: &VirtualDocumentSnapshot,
        params: &DocumentDiagnosticParams,
        cancel: &CancellationToken,
    ) -> RouterResult<Vec<Diagnostic>> {
        let kind = virtual_document.kind();
        let Some(synchronized) = self
            .synchronizer
            .synchronize_snapshot(host.version(), virtual_document, cancel)
            .await
        else {
            log::debug!(
                target: LOG_TARGET,
                "Skipping {} diagnostics for {}: not synchronized with version {}",
                kind,
                host_uri,
                host.version()
            );
            return Ok(Vec::new());
        };

        let projected = DocumentDiagnosticParams {
            text_document: TextDocumentIdentifier {
                uri: url_to_uri(synchronized.uri())?,
            },
            previous_result_id: None,
            ..params.clone()
        };

        let mut diagnostics = Vec::new();
        for content_type in self.content_types_for(kind) {
            let responses = self
                .router
                .reinvoke_all::<_, DocumentDiagnosticReport>(
                    "textDocument/diagnostic",
                    &content_type,
                    &projected,
                    cancel,
                )
                .await?;
            for response in responses {
                match response.response {
                    DocumentDiagnosticReport::Full(report) => {
                        diagnostics.extend(report.full_document_diagnostic_report.items);
                    }
                    DocumentDiagnosticReport::Unchanged(_) => log::debug!(
                        target: LOG_TARGET,
                        "{} reported unchanged diagnostics without a previous result",
                        response.server_name
                    ),
                }
            }
        }
        if diagnostics.is_empty() {
            return Ok(diagnostics);
        }

        let ranges: Vec<Range> = diagnostics.iter().map(|diagnostic| diagnostic.range).collect();
        let Some(mapped) = self
            .mapper
            .map_ranges(kind, host_uri, &ranges, host.version(), cancel)
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut remapped = Vec::with_capacity(diagnostics.len());
        for (diagnostic, range) in diagnostics.into_iter().zip(mapped.ranges) {
            let Some(range) = range else {
                continue;
            };
            let related_information = match diagnostic.related_information {
                Some(related) => Some(self.remap_related_information(related, cancel).await?),
                None => None,
            };
            remapped.push(Diagnostic {
                range,
                related_information,
                ..diagnostic
            });
        }
        Ok(remapped)
    }

    async fn remap_related_information(
        &self,
        related: Vec<DiagnosticRelatedInformation>,
        cancel: &CancellationToken,
    ) -> RouterResult<Vec<DiagnosticRelatedInformation>> {
        let mut remapped = Vec::with_capacity(related.len());
        for information in related {
            let Some(location) = self
                .mapper
                .remap_locations(vec![information.location], cancel)
                .await?
                .into_iter()
                .next()
            else {
                continue;
            };
            remapped.push(DiagnosticRelatedInformation {
                location,
                message: information.message,
            });
        }
        Ok(remapped)
    }
}
