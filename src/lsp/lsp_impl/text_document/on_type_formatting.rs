//! On-type formatting method for RazorRouter.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::{DocumentOnTypeFormattingParams, TextEdit};

use crate::document::LanguageKind;

use super::super::RazorRouter;

const LOG_TARGET: &str = "razor_router::formatting";

impl RazorRouter {
    /// Formatting edits from the C# server go through the mapping service
    /// together with the editor's formatting options.
    pub async fn on_type_formatting(
        &self,
        params: DocumentOnTypeFormattingParams,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<TextEdit>>> {
        let lsp_uri = params.text_document_position.text_document.uri.clone();
        let position = params.text_document_position.position;

        let Some(context) = self
            .resolve_projection(&lsp_uri, position, "onTypeFormatting", cancel)
            .await?
        else {
            return Ok(None);
        };
        if context.kind() != LanguageKind::CSharp {
            log::debug!(target: LOG_TARGET, "No on-type formatting in {}", context.kind());
            return Ok(None);
        }

        let options = params.options.clone();
        let mut projected = params;
        projected.text_document_position.text_document.uri = context.projected_uri.clone();
        projected.text_document_position.position = context.projection.position;

        let Some(answer) = self
            .router
            .reinvoke::<_, Vec<TextEdit>>(
                "textDocument/onTypeFormatting",
                &context.content_types,
                &projected,
                cancel,
            )
            .await?
        else {
            return Ok(None);
        };

        let edits = self
            .mapper
            .remap_text_edits(
                context.kind(),
                &context.host_uri,
                &answer.response,
                Some(&options),
                false,
                context.expected_host_version(),
                cancel,
            )
            .await?;
        if edits.is_empty() {
            log::debug!(
                target: LOG_TARGET,
                "No formatting edits from {} survived mapping",
                answer.server_name
            );
            return Ok(None);
        }
        Ok(Some(edits))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tower_lsp_server::ls_types::{
        FormattingOptions, Position, TextDocumentIdentifier, TextDocumentPositionParams,
    };

    use super::*;
    use crate::lsp::lsp_impl::tests::{RecordingEndpoint, host_uri, router_with_document};
    use crate::lsp::mapping::tests::ShiftingMappingService;

    fn params() -> DocumentOnTypeFormattingParams {
        DocumentOnTypeFormattingParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri: host_uri() },
                position: Position { line: 0, character: 14 },
            },
            ch: ";".to_string(),
            options: FormattingOptions {
                tab_size: 4,
                insert_spaces: true,
                ..FormattingOptions::default()
            },
        }
    }

    fn edits() -> serde_json::Value {
        json!([{
            "range": {
                "start": { "line": 4, "character": 0 },
                "end": { "line": 4, "character": 2 }
            },
            "newText": "    "
        }])
    }

    #[tokio::test]
    async fn formatting_edits_are_remapped_with_the_editor_options() {
        let mapping = ShiftingMappingService::new(1, Some(1));
        let router =
            router_with_document(LanguageKind::CSharp, mapping.clone(), "@code { int x; }").await;
        let roslyn = RecordingEndpoint::answering("textDocument/onTypeFormatting", edits());
        router.register_language_server("roslyn", LanguageKind::CSharp, roslyn.clone());

        let edits = router
            .on_type_formatting(params(), &CancellationToken::new())
            .await
            .unwrap()
            .expect("edits");

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].range.start.line, 5);
        assert_eq!(*mapping.remap_calls.lock().unwrap(), 1);
        let sent = roslyn.requests_for("textDocument/onTypeFormatting");
        assert_eq!(sent[0]["ch"], ";");
        assert_eq!(sent[0]["options"]["tabSize"], 4);
    }

    #[tokio::test]
    async fn stale_formatting_is_no_result() {
        let router = router_with_document(
            LanguageKind::CSharp,
            ShiftingMappingService::new(1, Some(0)),
            "@code { int x; }",
        )
        .await;
        router.register_language_server(
            "roslyn",
            LanguageKind::CSharp,
            RecordingEndpoint::answering("textDocument/onTypeFormatting", edits()),
        );

        let edits = router
            .on_type_formatting(params(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(edits.is_none());
    }

    #[tokio::test]
    async fn markup_is_not_formatted_on_type() {
        let router = router_with_document(
            LanguageKind::Html,
            ShiftingMappingService::new(0, Some(1)),
            "<div></div>",
        )
        .await;
        let html = RecordingEndpoint::answering("textDocument/onTypeFormatting", edits());
        router.register_language_server("html", LanguageKind::Html, html.clone());

        let edits = router
            .on_type_formatting(params(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(edits.is_none());
        assert!(html.requests_for("textDocument/onTypeFormatting").is_empty());
    }
}
