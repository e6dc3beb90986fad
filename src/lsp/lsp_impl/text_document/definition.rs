//! Goto definition method for RazorRouter.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::{GotoDefinitionParams, GotoDefinitionResponse, Location, LocationLink};

use super::super::RazorRouter;

/// Convert LocationLink to Location for clients that don't support link format.
///
/// Uses `target_selection_range` (the symbol name) rather than `target_range`
/// (the whole definition) for more precise navigation to the symbol itself.
fn location_link_to_location(link: LocationLink) -> Location {
    Location {
        uri: link.target_uri,
        range: link.target_selection_range,
    }
}

impl RazorRouter {
    pub async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
        cancel: &CancellationToken,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let lsp_uri = params.text_document_position_params.text_document.uri.clone();
        let position = params.text_document_position_params.position;

        let Some(context) = self
            .resolve_projection(&lsp_uri, position, "definition", cancel)
            .await?
        else {
            return Ok(None);
        };

        let mut projected = params;
        projected.text_document_position_params.text_document.uri = context.projected_uri.clone();
        projected.text_document_position_params.position = context.projection.position;

        let Some(answer) = self
            .router
            .reinvoke::<_, GotoDefinitionResponse>(
                "textDocument/definition",
                &context.content_types,
                &projected,
                cancel,
            )
            .await?
        else {
            return Ok(None);
        };

        let response = match answer.response {
            GotoDefinitionResponse::Scalar(location) => {
                GotoDefinitionResponse::Array(self.mapper.remap_locations(vec![location], cancel).await?)
            }
            GotoDefinitionResponse::Array(locations) => {
                GotoDefinitionResponse::Array(self.mapper.remap_locations(locations, cancel).await?)
            }
            GotoDefinitionResponse::Link(links) => {
                // The origin range is in projected coordinates; the editor
                // falls back to the word at the cursor without it.
                let links = links
                    .into_iter()
                    .map(|link| LocationLink {
                        origin_selection_range: None,
                        ..link
                    })
                    .collect();
                let links = self.mapper.remap_location_links(links, cancel).await?;
                if self.settings_manager.supports_definition_link() {
                    GotoDefinitionResponse::Link(links)
                } else {
                    GotoDefinitionResponse::Array(
                        links.into_iter().map(location_link_to_location).collect(),
                    )
                }
            }
        };

        let is_empty = match &response {
            GotoDefinitionResponse::Scalar(_) => false,
            GotoDefinitionResponse::Array(locations) => locations.is_empty(),
            GotoDefinitionResponse::Link(links) => links.is_empty(),
        };
        if is_empty {
            log::debug!(
                target: "razor_router::definition",
                "No definition from {} survived mapping",
                answer.server_name
            );
            return Ok(None);
        }
        Ok(Some(response))
    }
}
