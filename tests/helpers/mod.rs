//! Fake collaborators for driving `RazorRouter` through its public API.

#![allow(dead_code)]

use std::io;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use razor_router::{
    DocumentMappingService, LanguageClassification, LanguageClassifier, LanguageKind,
    LanguageServerEndpoint, MappedRanges, RazorRouter, RemappedEdits, RouterResult,
    VirtualDocumentUpdate,
};
use serde_json::Value;
use tower_lsp_server::ls_types::{
    DidOpenTextDocumentParams, FormattingOptions, Position, Range, TextDocumentItem, TextEdit,
    Uri,
};
use url::Url;

pub const HOST: &str = "file:///workspace/Pages/Counter.razor";
pub const VIRTUAL_CSHARP: &str = "file:///workspace/Pages/Counter.razor__virtual.cs";

pub fn host_uri() -> Uri {
    Uri::from_str(HOST).unwrap()
}

pub fn host_url() -> Url {
    Url::parse(HOST).unwrap()
}

/// Classifier answering every position with one language.
pub struct StaticClassifier {
    pub kind: LanguageKind,
    pub host_document_version: Option<i32>,
}

#[async_trait]
impl LanguageClassifier for StaticClassifier {
    async fn classify(
        &self,
        _host_uri: &Url,
        position: Position,
    ) -> RouterResult<Option<LanguageClassification>> {
        Ok(Some(LanguageClassification {
            kind: self.kind,
            position,
            host_document_version: self.host_document_version,
        }))
    }
}

/// Mapping service moving ranges `line_offset` lines down.
pub struct LineShiftMapping {
    pub line_offset: u32,
    pub host_document_version: Mutex<Option<i32>>,
    pub remap_calls: Mutex<usize>,
}

impl LineShiftMapping {
    pub fn new(line_offset: u32, host_document_version: i32) -> Arc<Self> {
        Arc::new(Self {
            line_offset,
            host_document_version: Mutex::new(Some(host_document_version)),
            remap_calls: Mutex::new(0),
        })
    }

    fn shift(&self, range: Range) -> Range {
        Range {
            start: Position {
                line: range.start.line + self.line_offset,
                character: range.start.character,
            },
            end: Position {
                line: range.end.line + self.line_offset,
                character: range.end.character,
            },
        }
    }
}

#[async_trait]
impl DocumentMappingService for LineShiftMapping {
    async fn map_to_host_ranges(
        &self,
        _kind: LanguageKind,
        _host_uri: &Url,
        ranges: &[Range],
    ) -> RouterResult<Option<MappedRanges>> {
        Ok(Some(MappedRanges {
            ranges: ranges.iter().map(|range| Some(self.shift(*range))).collect(),
            host_document_version: *self.host_document_version.lock().unwrap(),
        }))
    }

    async fn remap_text_edits(
        &self,
        _kind: LanguageKind,
        _host_uri: &Url,
        edits: &[TextEdit],
        _formatting_options: Option<&FormattingOptions>,
        _contains_snippet: bool,
    ) -> RouterResult<Option<RemappedEdits>> {
        *self.remap_calls.lock().unwrap() += 1;
        Ok(Some(RemappedEdits {
            edits: edits
                .iter()
                .map(|edit| TextEdit {
                    range: self.shift(edit.range),
                    new_text: edit.new_text.clone(),
                })
                .collect(),
            host_document_version: *self.host_document_version.lock().unwrap(),
        }))
    }
}

/// Backing server answering from a fixed table and recording requests.
#[derive(Default)]
pub struct ScriptedServer {
    answers: Mutex<Vec<(String, Value)>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(self: &Arc<Self>, method: &str, answer: Value) -> Arc<Self> {
        self.answers
            .lock()
            .unwrap()
            .push((method.to_string(), answer));
        Arc::clone(self)
    }

    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageServerEndpoint for ScriptedServer {
    async fn send_request(&self, method: &str, params: Value) -> io::Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        Ok(self
            .answers
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, answer)| answer.clone())
            .unwrap_or(Value::Null))
    }

    async fn send_notification(&self, _method: &str, _params: Value) -> io::Result<()> {
        Ok(())
    }
}

/// Open `text` at version 1 and generate both virtual documents from it.
pub async fn open_host_document(router: &RazorRouter, text: &str) {
    router.did_open(DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri: host_uri(),
            language_id: "razor".to_string(),
            version: 1,
            text: text.to_string(),
        },
    });
    for kind in [LanguageKind::Html, LanguageKind::CSharp] {
        router
            .update_virtual_document(VirtualDocumentUpdate {
                host_document_uri: host_url(),
                kind,
                host_document_version: 1,
                changes: vec![],
            })
            .await
            .unwrap();
    }
}

pub fn router_for(kind: LanguageKind, mapping: Arc<LineShiftMapping>) -> RazorRouter {
    RazorRouter::new(
        Arc::new(StaticClassifier {
            kind,
            host_document_version: Some(1),
        }),
        mapping,
    )
}
