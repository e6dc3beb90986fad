//! Completion item resolve method for RazorRouter.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::CompletionItem;

use crate::error::RouterError;

use super::super::RazorRouter;
use super::completion::{unwrap_item_data, wrap_item_data};

const LOG_TARGET: &str = "razor_router::completion";

impl RazorRouter {
    /// Resolve an item on the server that produced its completion list.
    ///
    /// The item already carries host coordinates, so only fields the server
    /// changed are mapped; everything else is returned as sent.
    pub async fn completion_resolve(
        &self,
        item: CompletionItem,
        cancel: &CancellationToken,
    ) -> Result<CompletionItem> {
        let mut item = item;
        let (result_id, original_data) = unwrap_item_data(item.data.take());
        item.data = original_data;
        let Some(result_id) = result_id else {
            return Ok(item);
        };
        let Some(request_context) = self.completion_cache.get(result_id) else {
            log::debug!(
                target: LOG_TARGET,
                "Completion list {} is no longer cached; '{}' not resolved",
                result_id,
                item.label
            );
            return Ok(item);
        };

        let resolved = match self
            .router
            .send::<_, CompletionItem>(
                "completionItem/resolve",
                &request_context.server_name,
                &item,
                cancel,
            )
            .await
        {
            Ok(resolved) => resolved,
            Err(RouterError::ServerNotFound { server }) => {
                log::debug!(target: LOG_TARGET, "{} is no longer registered", server);
                None
            }
            Err(err) => return Err(err.into()),
        };
        let Some(mut resolved) = resolved else {
            wrap_item_data(&mut item, result_id);
            return Ok(item);
        };

        if resolved.text_edit.is_none() {
            resolved.text_edit = item.text_edit.clone();
        }
        if resolved.additional_text_edits.is_none() {
            resolved.additional_text_edits = item.additional_text_edits.clone();
        }

        let text_edit_changed = resolved.text_edit != item.text_edit;
        let additional_changed = resolved.additional_text_edits != item.additional_text_edits;
        if text_edit_changed || additional_changed {
            let kind = request_context.projected_kind;
            let host_uri = &request_context.host_document_uri;
            match self.store.host_version(host_uri) {
                Some(expected) => {
                    if text_edit_changed {
                        self.remap_primary_edits(
                            kind,
                            host_uri,
                            expected,
                            std::slice::from_mut(&mut resolved),
                            cancel,
                        )
                        .await?;
                    }
                    if additional_changed
                        && let Some(edits) = resolved.additional_text_edits.take()
                    {
                        resolved.additional_text_edits = self
                            .remap_additional_edits(kind, host_uri, &edits, expected, cancel)
                            .await?;
                    }
                }
                None => {
                    log::debug!(target: LOG_TARGET, "{} was closed; keeping original edits", host_uri);
                    resolved.text_edit = item.text_edit;
                    resolved.additional_text_edits = item.additional_text_edits;
                }
            }
        }

        wrap_item_data(&mut resolved, result_id);
        Ok(resolved)
    }
}
