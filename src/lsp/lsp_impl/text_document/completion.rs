//! Completion method for RazorRouter.
//!
//! Items returned to the editor carry the id of a cached
//! [`CompletionRequestContext`] in their `data`, so that
//! `completionItem/resolve` can find the server that produced them.

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::{
    CompletionItem, CompletionList, CompletionParams, CompletionResponse, CompletionTextEdit,
    CompletionTriggerKind, InsertReplaceEdit, Range, TextEdit,
};
use url::Url;

use crate::completion::{CompletionOptions, RazorCompletionItem};
use crate::document::{LanguageKind, PositionMapper};
use crate::error::RouterResult;
use crate::lsp::completion_cache::CompletionRequestContext;

use super::super::RazorRouter;
use super::super::projection_context::ProjectionContext;

const LOG_TARGET: &str = "razor_router::completion";

/// Key of the cached context id inside wrapped item data.
pub(crate) const RESULT_ID_KEY: &str = "_razor_resultId";
/// Key of the server's own item data inside wrapped item data.
pub(crate) const ORIGINAL_DATA_KEY: &str = "original";

/// Razor transition; the C# server only sees it as an explicit invocation.
const TRANSITION_TRIGGER: &str = "@";

pub(crate) fn wrap_item_data(item: &mut CompletionItem, result_id: u64) {
    let mut data = Map::new();
    data.insert(RESULT_ID_KEY.to_string(), Value::from(result_id));
    data.insert(
        ORIGINAL_DATA_KEY.to_string(),
        item.data.take().unwrap_or(Value::Null),
    );
    item.data = Some(Value::Object(data));
}

/// Split item data into the cached context id and the server's own data.
///
/// Data that was never wrapped comes back unchanged with no id.
pub(crate) fn unwrap_item_data(data: Option<Value>) -> (Option<u64>, Option<Value>) {
    match data {
        Some(Value::Object(mut map)) if map.contains_key(RESULT_ID_KEY) => {
            let result_id = map.get(RESULT_ID_KEY).and_then(Value::as_u64);
            let original = map.remove(ORIGINAL_DATA_KEY).filter(|data| !data.is_null());
            (result_id, original)
        }
        other => (None, other),
    }
}

fn into_list(response: CompletionResponse) -> CompletionList {
    match response {
        CompletionResponse::Array(items) => CompletionList {
            is_incomplete: false,
            items,
        },
        CompletionResponse::List(list) => list,
    }
}

impl RazorRouter {
    /// Completion for the language under the cursor.
    ///
    /// Razor positions have no completion here. HTML lists are extended
    /// with tag-helper candidates from the document context provider.
    pub async fn completion(
        &self,
        params: CompletionParams,
        cancel: &CancellationToken,
    ) -> Result<Option<CompletionResponse>> {
        let lsp_uri = params.text_document_position.text_document.uri.clone();
        let position = params.text_document_position.position;

        let Some(context) = self
            .resolve_projection(&lsp_uri, position, "completion", cancel)
            .await?
        else {
            return Ok(None);
        };

        let triggered_by_transition = params
            .context
            .as_ref()
            .is_some_and(|trigger| {
                trigger.trigger_kind == CompletionTriggerKind::TRIGGER_CHARACTER
                    && trigger.trigger_character.as_deref() == Some(TRANSITION_TRIGGER)
            });
        if triggered_by_transition && context.kind() == LanguageKind::Html {
            log::debug!(target: LOG_TARGET, "Ignoring transition trigger in markup");
            return Ok(None);
        }

        let mut projected = params;
        projected.text_document_position.text_document.uri = context.projected_uri.clone();
        projected.text_document_position.position = context.projection.position;
        if triggered_by_transition && let Some(trigger) = projected.context.as_mut() {
            trigger.trigger_kind = CompletionTriggerKind::INVOKED;
            trigger.trigger_character = None;
        }

        let answer = self
            .router
            .reinvoke::<_, CompletionResponse>(
                "textDocument/completion",
                &context.content_types,
                &projected,
                cancel,
            )
            .await?;

        let mut list = match answer {
            Some(answer) => {
                let mut list = into_list(answer.response);
                self.remap_completion_edits(&context, &mut list.items, cancel)
                    .await?;

                let result_id = self.completion_cache.set(CompletionRequestContext {
                    host_document_uri: context.host_uri.clone(),
                    projected_uri: context.projection.uri.clone(),
                    projected_kind: context.kind(),
                    server_name: answer.server_name,
                });
                for item in &mut list.items {
                    wrap_item_data(item, result_id);
                }
                Some(list)
            }
            None => None,
        };

        if context.kind() == LanguageKind::Html {
            let tag_helper_items = self.tag_helper_completions(&context).await?;
            if !tag_helper_items.is_empty() {
                list.get_or_insert_with(|| CompletionList {
                    is_incomplete: false,
                    items: Vec::new(),
                })
                .items
                .extend(tag_helper_items);
            }
        }

        Ok(list.map(CompletionResponse::List))
    }

    /// Map the edits of every item in one batch, then its additional edits.
    async fn remap_completion_edits(
        &self,
        context: &ProjectionContext,
        items: &mut [CompletionItem],
        cancel: &CancellationToken,
    ) -> RouterResult<()> {
        self.remap_primary_edits(
            context.kind(),
            &context.host_uri,
            context.expected_host_version(),
            items,
            cancel,
        )
        .await?;
        for item in items.iter_mut() {
            if let Some(edits) = item.additional_text_edits.take() {
                item.additional_text_edits = self
                    .remap_additional_edits(
                        context.kind(),
                        &context.host_uri,
                        &edits,
                        context.expected_host_version(),
                        cancel,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Map `text_edit` of every item with a single mapping call.
    ///
    /// An item whose edit cannot be mapped, or whose mapping is stale, loses
    /// its edit and falls back to inserting the edit's text at the cursor.
    pub(super) async fn remap_primary_edits(
        &self,
        kind: LanguageKind,
        host_uri: &Url,
        expected_host_version: i32,
        items: &mut [CompletionItem],
        cancel: &CancellationToken,
    ) -> RouterResult<()> {
        let ranges: Vec<Range> = items
            .iter()
            .flat_map(|item| match &item.text_edit {
                Some(CompletionTextEdit::Edit(edit)) => vec![edit.range],
                Some(CompletionTextEdit::InsertAndReplace(edit)) => vec![edit.insert, edit.replace],
                None => Vec::new(),
            })
            .collect();
        if ranges.is_empty() {
            return Ok(());
        }

        let mapped = self
            .mapper
            .map_ranges(kind, host_uri, &ranges, expected_host_version, cancel)
            .await?;
        let mut mapped = mapped.map(|mapped| mapped.ranges.into_iter());
        let mut next_range = || mapped.as_mut().and_then(Iterator::next).flatten();

        for item in items.iter_mut() {
            let Some(text_edit) = item.text_edit.take() else {
                continue;
            };
            match text_edit {
                CompletionTextEdit::Edit(edit) => match next_range() {
                    Some(range) => {
                        item.text_edit = Some(CompletionTextEdit::Edit(TextEdit {
                            range,
                            new_text: edit.new_text,
                        }));
                    }
                    None => item.insert_text = Some(edit.new_text),
                },
                CompletionTextEdit::InsertAndReplace(edit) => {
                    let insert = next_range();
                    let replace = next_range();
                    match (insert, replace) {
                        (Some(insert), Some(replace)) => {
                            item.text_edit =
                                Some(CompletionTextEdit::InsertAndReplace(InsertReplaceEdit {
                                    new_text: edit.new_text,
                                    insert,
                                    replace,
                                }));
                        }
                        _ => item.insert_text = Some(edit.new_text),
                    }
                }
            }
            if item.text_edit.is_none() {
                log::debug!(
                    target: LOG_TARGET,
                    "Dropped unmappable edit of completion item '{}'",
                    item.label
                );
            }
        }
        Ok(())
    }

    /// `None` when no additional edit survives mapping.
    pub(super) async fn remap_additional_edits(
        &self,
        kind: LanguageKind,
        host_uri: &Url,
        edits: &[TextEdit],
        expected_host_version: i32,
        cancel: &CancellationToken,
    ) -> RouterResult<Option<Vec<TextEdit>>> {
        let edits = self
            .mapper
            .remap_text_edits(
                kind,
                host_uri,
                edits,
                None,
                false,
                expected_host_version,
                cancel,
            )
            .await?;
        Ok((!edits.is_empty()).then_some(edits))
    }

    /// Tag-helper candidates at the cursor, computed on the host document.
    async fn tag_helper_completions(
        &self,
        context: &ProjectionContext,
    ) -> RouterResult<Vec<CompletionItem>> {
        let Some(provider) = &self.document_context else {
            return Ok(Vec::new());
        };
        let Some(document) = provider.document_context(&context.host_uri).await? else {
            return Ok(Vec::new());
        };
        if document.host_document_version != context.host.version() {
            log::debug!(
                target: LOG_TARGET,
                "Razor document context for {} is at version {}, request at {}",
                context.host_uri,
                document.host_document_version,
                context.host.version()
            );
            return Ok(Vec::new());
        }
        let Some(offset) =
            PositionMapper::new(context.host.text()).position_to_byte(context.host_position)
        else {
            return Ok(Vec::new());
        };

        let options = CompletionOptions {
            snippets_supported: self.settings_manager.supports_completion_snippets(),
        };
        Ok(self
            .completion_engine
            .completions(&document.syntax_tree, &document.tag_helpers, offset, options)
            .iter()
            .map(RazorCompletionItem::to_completion_item)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tower_lsp_server::ls_types::{
        CompletionContext, PartialResultParams, Position, TextDocumentIdentifier,
        TextDocumentPositionParams, WorkDoneProgressParams,
    };

    use super::*;
    use crate::completion::{
        RazorDocumentContext, RazorDocumentContextProvider, SyntaxKind, SyntaxNode, SyntaxTree,
        TagHelperDescriptor, TagHelperDocumentContext, TagMatchingRule, TextSpan,
    };
    use crate::lsp::lsp_impl::tests::{RecordingEndpoint, host_uri, router_with_document};
    use crate::lsp::mapping::tests::ShiftingMappingService;

    fn params(character: u32, trigger: Option<&str>) -> CompletionParams {
        CompletionParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri: host_uri() },
                position: Position { line: 0, character },
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: Some(match trigger {
                Some(character) => CompletionContext {
                    trigger_kind: CompletionTriggerKind::TRIGGER_CHARACTER,
                    trigger_character: Some(character.to_string()),
                },
                None => CompletionContext {
                    trigger_kind: CompletionTriggerKind::INVOKED,
                    trigger_character: None,
                },
            }),
        }
    }

    fn csharp_items() -> Value {
        json!({
            "isIncomplete": true,
            "items": [
                {
                    "label": "DateTime",
                    "textEdit": {
                        "range": {
                            "start": { "line": 4, "character": 1 },
                            "end": { "line": 4, "character": 3 }
                        },
                        "newText": "DateTime"
                    },
                    "additionalTextEdits": [{
                        "range": {
                            "start": { "line": 0, "character": 0 },
                            "end": { "line": 0, "character": 0 }
                        },
                        "newText": "@using System\n"
                    }],
                    "data": { "roslyn": 7 }
                },
                { "label": "Console" }
            ]
        })
    }

    #[test]
    fn item_data_wraps_and_unwraps() {
        let mut item = CompletionItem {
            label: "x".to_string(),
            data: Some(json!({ "roslyn": 7 })),
            ..Default::default()
        };

        wrap_item_data(&mut item, 42);

        assert_eq!(
            item.data,
            Some(json!({ "_razor_resultId": 42, "original": { "roslyn": 7 } }))
        );
        assert_eq!(
            unwrap_item_data(item.data),
            (Some(42), Some(json!({ "roslyn": 7 })))
        );
        assert_eq!(
            unwrap_item_data(Some(json!({ "other": 1 }))),
            (None, Some(json!({ "other": 1 })))
        );
    }

    #[tokio::test]
    async fn csharp_completion_is_mapped_and_tagged_for_resolve() {
        let router = router_with_document(
            LanguageKind::CSharp,
            ShiftingMappingService::new(1, Some(1)),
            "@DateTime.Now",
        )
        .await;
        let roslyn = RecordingEndpoint::answering("textDocument/completion", csharp_items());
        router.register_language_server("roslyn", LanguageKind::CSharp, roslyn.clone());

        let Some(CompletionResponse::List(list)) = router
            .completion(params(1, Some("@")), &CancellationToken::new())
            .await
            .unwrap()
        else {
            panic!("expected a completion list");
        };

        assert!(list.is_incomplete);
        let Some(CompletionTextEdit::Edit(edit)) = &list.items[0].text_edit else {
            panic!("expected a mapped edit");
        };
        assert_eq!(edit.range.start.line, 5);
        let additional = list.items[0].additional_text_edits.as_ref().unwrap();
        assert_eq!(additional[0].range.start.line, 1);

        let (result_id, original) = unwrap_item_data(list.items[0].data.clone());
        let result_id = result_id.expect("tagged item");
        assert_eq!(original, Some(json!({ "roslyn": 7 })));
        let cached = router.completion_cache.get(result_id).expect("cached context");
        assert_eq!(cached.server_name, "roslyn");
        assert_eq!(cached.projected_kind, LanguageKind::CSharp);

        let sent = roslyn.requests_for("textDocument/completion");
        assert_eq!(sent[0]["context"]["triggerKind"], 1);
        assert!(sent[0]["context"].get("triggerCharacter").is_none());
    }

    #[tokio::test]
    async fn stale_edits_fall_back_to_insert_text() {
        let router = router_with_document(
            LanguageKind::CSharp,
            ShiftingMappingService::new(1, Some(0)),
            "@DateTime.Now",
        )
        .await;
        router.register_language_server(
            "roslyn",
            LanguageKind::CSharp,
            RecordingEndpoint::answering("textDocument/completion", csharp_items()),
        );

        let Some(CompletionResponse::List(list)) = router
            .completion(params(1, None), &CancellationToken::new())
            .await
            .unwrap()
        else {
            panic!("expected a completion list");
        };

        let item = &list.items[0];
        assert!(item.text_edit.is_none());
        assert_eq!(item.insert_text.as_deref(), Some("DateTime"));
        assert!(item.additional_text_edits.is_none());
    }

    #[tokio::test]
    async fn razor_position_has_no_completion() {
        let router = router_with_document(
            LanguageKind::Razor,
            ShiftingMappingService::new(0, Some(1)),
            "@page \"/\"",
        )
        .await;
        let roslyn = RecordingEndpoint::answering("textDocument/completion", csharp_items());
        router.register_language_server("roslyn", LanguageKind::CSharp, roslyn.clone());

        let response = router
            .completion(params(1, None), &CancellationToken::new())
            .await
            .unwrap();

        assert!(response.is_none());
        assert!(roslyn.requests_for("textDocument/completion").is_empty());
    }

    /// Document context for `<my` with a `my-component` tag helper.
    struct PartialTagContext {
        host_document_version: i32,
    }

    #[async_trait]
    impl RazorDocumentContextProvider for PartialTagContext {
        async fn document_context(
            &self,
            _host_uri: &Url,
        ) -> RouterResult<Option<RazorDocumentContext>> {
            let start_tag = SyntaxNode::new(
                SyntaxKind::StartTag {
                    name: "my".into(),
                    name_span: TextSpan::new(1, 3),
                    attributes_span: TextSpan::new(3, 3),
                },
                TextSpan::new(0, 3),
                vec![],
            );
            let element = SyntaxNode::new(
                SyntaxKind::Element { tag_helper: false },
                TextSpan::new(0, 3),
                vec![start_tag],
            );
            let tree = SyntaxTree::new(SyntaxNode::new(
                SyntaxKind::Document,
                TextSpan::new(0, 3),
                vec![element],
            ));
            let component = TagHelperDescriptor::new("MyComponent")
                .with_rule(TagMatchingRule::new("my-component"));
            Ok(Some(RazorDocumentContext {
                syntax_tree: Arc::new(tree),
                tag_helpers: Arc::new(TagHelperDocumentContext::new(None, vec![Arc::new(
                    component,
                )])),
                host_document_version: self.host_document_version,
            }))
        }
    }

    #[tokio::test]
    async fn markup_completion_includes_tag_helper_elements() {
        let router = router_with_document(
            LanguageKind::Html,
            ShiftingMappingService::new(0, Some(1)),
            "<my",
        )
        .await
        .with_document_context(Arc::new(PartialTagContext {
            host_document_version: 1,
        }));
        router.register_language_server(
            "html",
            LanguageKind::Html,
            RecordingEndpoint::answering(
                "textDocument/completion",
                json!([{ "label": "main" }]),
            ),
        );

        let Some(CompletionResponse::List(list)) = router
            .completion(params(3, None), &CancellationToken::new())
            .await
            .unwrap()
        else {
            panic!("expected a completion list");
        };

        let labels: Vec<_> = list.items.iter().map(|item| item.label.as_str()).collect();
        assert_eq!(labels, vec!["main", "my-component"]);
    }

    #[tokio::test]
    async fn tag_helpers_from_another_version_are_not_offered() {
        let router = router_with_document(
            LanguageKind::Html,
            ShiftingMappingService::new(0, Some(1)),
            "<my",
        )
        .await
        .with_document_context(Arc::new(PartialTagContext {
            host_document_version: 0,
        }));

        let response = router
            .completion(params(3, None), &CancellationToken::new())
            .await
            .unwrap();

        assert!(response.is_none());
    }

    #[tokio::test]
    async fn transition_trigger_is_not_sent_to_markup() {
        let router = router_with_document(
            LanguageKind::Html,
            ShiftingMappingService::new(0, Some(1)),
            "<div>@</div>",
        )
        .await;
        let html = RecordingEndpoint::answering("textDocument/completion", json!([]));
        router.register_language_server("html", LanguageKind::Html, html.clone());

        let response = router
            .completion(params(6, Some("@")), &CancellationToken::new())
            .await
            .unwrap();

        assert!(response.is_none());
        assert!(html.requests_for("textDocument/completion").is_empty());
    }
}
