//! Find references method for RazorRouter.
//!
//! Backing servers may stream references as partial results. The router
//! puts its own partial-result token into the projected request, collects
//! whatever `$/progress` notifications arrive for it through the progress
//! correlator, and merges them with the final response.

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::{Location, NumberOrString, ReferenceParams};
use ulid::Ulid;

use crate::error::LockResultExt;

use super::super::RazorRouter;

const LOG_TARGET: &str = "razor_router::references";

impl RazorRouter {
    pub async fn references(
        &self,
        params: ReferenceParams,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<Location>>> {
        let lsp_uri = params.text_document_position.text_document.uri.clone();
        let position = params.text_document_position.position;

        let Some(context) = self
            .resolve_projection(&lsp_uri, position, "references", cancel)
            .await?
        else {
            return Ok(None);
        };

        let token = NumberOrString::String(Ulid::new().to_string());
        let partials: Arc<Mutex<Vec<Location>>> = Arc::new(Mutex::new(Vec::new()));
        let listening = cancel.child_token();
        let collector = Arc::clone(&partials);
        let completion = self.progress.register(
            token.clone(),
            move |value| match serde_json::from_value::<Vec<Location>>(value) {
                Ok(locations) => {
                    if let Ok(mut partials) = collector.lock().recover_poison("references.partials") {
                        partials.extend(locations);
                    }
                }
                Err(err) => log::debug!(target: LOG_TARGET, "Ignoring malformed partial result: {}", err),
            },
            self.settings_manager.load_settings().progress_timeout,
            listening.clone(),
        );

        let mut projected = params;
        projected.text_document_position.text_document.uri = context.projected_uri.clone();
        projected.text_document_position.position = context.projection.position;
        projected.partial_result_params.partial_result_token = completion.as_ref().map(|_| token);

        let answer = self
            .router
            .reinvoke::<_, Vec<Location>>(
                "textDocument/references",
                &context.content_types,
                &projected,
                cancel,
            )
            .await;

        // Partial results precede the final response; stop listening and
        // let the listener hand over everything already delivered.
        listening.cancel();
        if let Some(completion) = completion {
            completion.wait().await;
        }
        let answer = answer?;

        let mut locations = partials
            .lock()
            .recover_poison("references.partials")
            .map(|mut partials| std::mem::take(&mut *partials))
            .unwrap_or_default();
        let answered = answer.is_some() || !locations.is_empty();
        if let Some(answer) = answer {
            log::debug!(
                target: LOG_TARGET,
                "{} returned {} references ({} streamed)",
                answer.server_name,
                answer.response.len(),
                locations.len()
            );
            locations.extend(answer.response);
        }
        if !answered {
            return Ok(None);
        }

        Ok(Some(self.mapper.remap_locations(locations, cancel).await?))
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::OnceLock;

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tower_lsp_server::ls_types::{
        PartialResultParams, Position, ReferenceContext, TextDocumentIdentifier,
        TextDocumentPositionParams, WorkDoneProgressParams,
    };

    use super::*;
    use crate::document::LanguageKind;
    use crate::lsp::bridge::LanguageServerEndpoint;
    use crate::lsp::lsp_impl::tests::{HOST, RecordingEndpoint, host_uri, router_with_document};
    use crate::lsp::mapping::tests::ShiftingMappingService;
    use crate::lsp::progress::PROGRESS_METHOD;

    fn params() -> ReferenceParams {
        ReferenceParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri: host_uri() },
                position: Position { line: 0, character: 10 },
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: ReferenceContext {
                include_declaration: true,
            },
        }
    }

    fn location(uri: &str, line: u32) -> Value {
        json!({
            "uri": uri,
            "range": {
                "start": { "line": line, "character": 0 },
                "end": { "line": line, "character": 1 }
            }
        })
    }

    /// Streams one partial result through the router before answering.
    struct StreamingEndpoint {
        router: OnceLock<Arc<RazorRouter>>,
    }

    #[async_trait]
    impl LanguageServerEndpoint for StreamingEndpoint {
        async fn send_request(&self, _method: &str, params: Value) -> io::Result<Value> {
            let token = params["partialResultToken"].clone();
            if let Some(router) = self.router.get() {
                router.handle_server_notification(
                    PROGRESS_METHOD,
                    &json!({
                        "token": token,
                        "value": [location("file:///project/Pages/Index.razor__virtual.cs", 2)]
                    }),
                );
            }
            Ok(json!([location("file:///project/Shared/Other.cs", 8)]))
        }

        async fn send_notification(&self, _method: &str, _params: Value) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn streamed_and_final_references_are_merged_and_mapped() {
        let router = Arc::new(
            router_with_document(
                LanguageKind::CSharp,
                ShiftingMappingService::new(3, Some(1)),
                "@code { int x; }",
            )
            .await,
        );
        let endpoint = Arc::new(StreamingEndpoint {
            router: OnceLock::new(),
        });
        let _ = endpoint.router.set(Arc::clone(&router));
        router.register_language_server("roslyn", LanguageKind::CSharp, endpoint);

        let locations = router
            .references(params(), &CancellationToken::new())
            .await
            .unwrap()
            .expect("references");

        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].uri.as_str(), HOST);
        assert_eq!(locations[0].range.start.line, 5);
        assert_eq!(locations[1].uri.as_str(), "file:///project/Shared/Other.cs");
    }

    #[tokio::test]
    async fn projected_request_carries_a_fresh_partial_result_token() {
        let router = router_with_document(
            LanguageKind::CSharp,
            ShiftingMappingService::new(0, Some(1)),
            "@code { int x; }",
        )
        .await;
        let roslyn = RecordingEndpoint::answering("textDocument/references", json!([]));
        router.register_language_server("roslyn", LanguageKind::CSharp, roslyn.clone());

        let locations = router
            .references(params(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(locations, Some(vec![]));
        let sent = roslyn.requests_for("textDocument/references");
        assert!(sent[0]["partialResultToken"].is_string());
        assert_eq!(sent[0]["context"]["includeDeclaration"], true);
    }

    #[tokio::test]
    async fn no_answer_is_no_result() {
        let router = router_with_document(
            LanguageKind::CSharp,
            ShiftingMappingService::new(0, Some(1)),
            "@code { int x; }",
        )
        .await;
        router.register_language_server(
            "roslyn",
            LanguageKind::CSharp,
            Arc::new(RecordingEndpoint::default()),
        );

        let locations = router
            .references(params(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(locations.is_none());
    }
}
