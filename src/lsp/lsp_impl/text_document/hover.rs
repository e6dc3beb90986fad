//! Hover method for RazorRouter.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::{Hover, HoverParams};

use super::super::RazorRouter;

impl RazorRouter {
    /// Hover is dispatched to the classified server and its range mapped back.
    ///
    /// A range that maps to nothing is removed while the contents are kept;
    /// a mapping computed against another host version discards the hover.
    pub async fn hover(
        &self,
        params: HoverParams,
        cancel: &CancellationToken,
    ) -> Result<Option<Hover>> {
        let lsp_uri = params.text_document_position_params.text_document.uri.clone();
        let position = params.text_document_position_params.position;

        let Some(context) = self
            .resolve_projection(&lsp_uri, position, "hover", cancel)
            .await?
        else {
            return Ok(None);
        };

        let mut projected = params;
        projected.text_document_position_params.text_document.uri = context.projected_uri.clone();
        projected.text_document_position_params.position = context.projection.position;

        let Some(answer) = self
            .router
            .reinvoke::<_, Hover>(
                "textDocument/hover",
                &context.content_types,
                &projected,
                cancel,
            )
            .await?
        else {
            return Ok(None);
        };
        let mut hover = answer.response;

        let Some(range) = hover.range else {
            return Ok(Some(hover));
        };
        let Some(mapped) = self
            .mapper
            .map_ranges(
                context.kind(),
                &context.host_uri,
                &[range],
                context.expected_host_version(),
                cancel,
            )
            .await?
        else {
            log::debug!(
                target: "razor_router::hover",
                "Discarding hover from {}: range could not be validated",
                answer.server_name
            );
            return Ok(None);
        };
        hover.range = mapped.ranges.into_iter().next().flatten();

        Ok(Some(hover))
    }
}
