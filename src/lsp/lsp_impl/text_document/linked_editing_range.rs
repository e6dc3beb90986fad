//! Linked editing range (on-type rename) method for RazorRouter.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::{LinkedEditingRangeParams, LinkedEditingRanges};

use crate::document::LanguageKind;

use super::super::RazorRouter;

const LOG_TARGET: &str = "razor_router::linked_editing";

impl RazorRouter {
    /// Matching tag pairs from the HTML server.
    ///
    /// Editing one range of the set edits all of them, so a set with any
    /// unmappable range is dropped as a whole.
    pub async fn linked_editing_range(
        &self,
        params: LinkedEditingRangeParams,
        cancel: &CancellationToken,
    ) -> Result<Option<LinkedEditingRanges>> {
        let lsp_uri = params.text_document_position_params.text_document.uri.clone();
        let position = params.text_document_position_params.position;

        let Some(context) = self
            .resolve_projection(&lsp_uri, position, "linkedEditingRange", cancel)
            .await?
        else {
            return Ok(None);
        };
        if context.kind() != LanguageKind::Html {
            return Ok(None);
        }

        let mut projected = params;
        projected.text_document_position_params.text_document.uri = context.projected_uri.clone();
        projected.text_document_position_params.position = context.projection.position;

        let Some(answer) = self
            .router
            .reinvoke::<_, LinkedEditingRanges>(
                "textDocument/linkedEditingRange",
                &context.content_types,
                &projected,
                cancel,
            )
            .await?
        else {
            return Ok(None);
        };
        let linked = answer.response;

        let Some(mapped) = self
            .mapper
            .map_ranges(
                context.kind(),
                &context.host_uri,
                &linked.ranges,
                context.expected_host_version(),
                cancel,
            )
            .await?
        else {
            return Ok(None);
        };
        let Some(ranges) = mapped.ranges.into_iter().collect::<Option<Vec<_>>>() else {
            log::debug!(
                target: LOG_TARGET,
                "Dropping linked ranges from {}: not every range maps to the host",
                answer.server_name
            );
            return Ok(None);
        };

        Ok(Some(LinkedEditingRanges {
            ranges,
            word_pattern: linked.word_pattern,
        }))
    }
}
