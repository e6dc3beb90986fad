//! Document highlight method for RazorRouter.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::{DocumentHighlight, DocumentHighlightParams, Range};

use super::super::RazorRouter;

impl RazorRouter {
    /// Highlights are mapped in one batch; ones without a host range are
    /// dropped.
    pub async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<DocumentHighlight>>> {
        let lsp_uri = params.text_document_position_params.text_document.uri.clone();
        let position = params.text_document_position_params.position;

        let Some(context) = self
            .resolve_projection(&lsp_uri, position, "documentHighlight", cancel)
            .await?
        else {
            return Ok(None);
        };

        let mut projected = params;
        projected.text_document_position_params.text_document.uri = context.projected_uri.clone();
        projected.text_document_position_params.position = context.projection.position;

        let Some(answer) = self
            .router
            .reinvoke::<_, Vec<DocumentHighlight>>(
                "textDocument/documentHighlight",
                &context.content_types,
                &projected,
                cancel,
            )
            .await?
        else {
            return Ok(None);
        };
        let highlights = answer.response;
        if highlights.is_empty() {
            return Ok(Some(highlights));
        }

        let ranges: Vec<Range> = highlights.iter().map(|highlight| highlight.range).collect();
        let Some(mapped) = self
            .mapper
            .map_ranges(
                context.kind(),
                &context.host_uri,
                &ranges,
                context.expected_host_version(),
                cancel,
            )
            .await?
        else {
            return Ok(None);
        };

        let highlights = highlights
            .into_iter()
            .zip(mapped.ranges)
            .filter_map(|(highlight, range)| {
                range.map(|range| DocumentHighlight { range, ..highlight })
            })
            .collect();
        Ok(Some(highlights))
    }
}
