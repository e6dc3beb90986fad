//! Rename method for RazorRouter.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::{RenameParams, WorkspaceEdit};

use crate::document::LanguageKind;

use super::super::RazorRouter;

impl RazorRouter {
    /// Only C# symbols are renamed; markup renames go through linked editing.
    pub async fn rename(
        &self,
        params: RenameParams,
        cancel: &CancellationToken,
    ) -> Result<Option<WorkspaceEdit>> {
        let lsp_uri = params.text_document_position.text_document.uri.clone();
        let position = params.text_document_position.position;

        let Some(context) = self
            .resolve_projection(&lsp_uri, position, "rename", cancel)
            .await?
        else {
            return Ok(None);
        };
        if context.kind() != LanguageKind::CSharp {
            log::debug!(target: "razor_router::rename", "Rename in {} is not supported", context.kind());
            return Ok(None);
        }

        let mut projected = params;
        projected.text_document_position.text_document.uri = context.projected_uri.clone();
        projected.text_document_position.position = context.projection.position;

        let Some(answer) = self
            .router
            .reinvoke::<_, WorkspaceEdit>(
                "textDocument/rename",
                &context.content_types,
                &projected,
                cancel,
            )
            .await?
        else {
            return Ok(None);
        };

        let edit = self
            .mapper
            .remap_workspace_edit(answer.response, cancel)
            .await?;
        Ok(Some(edit))
    }
}
