//! Razor-native completion: tag-helper elements and attributes.
//!
//! These candidates come from the Razor document model rather than a
//! backing server, and are merged into HTML completion lists.

pub mod engine;
mod html_facts;
pub mod syntax;
pub mod tag_helper;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::error::RouterResult;

pub use engine::{
    CompletionCandidateEngine, CompletionOptions, RazorCompletionItem, RazorCompletionItemKind,
};
pub use html_facts::is_html_tag_name;
pub use syntax::{AttributeNode, SyntaxKind, SyntaxNode, SyntaxTree, TextSpan};
pub use tag_helper::{
    AttributeCompletionContext, AttributeCompletionResult, BoundAttributeDescriptor,
    DefaultTagHelperCompletionProvider, ElementCompletionContext, ElementCompletionResult,
    TagHelperCompletionProvider, TagHelperDescriptor, TagHelperDocumentContext, TagMatchingRule,
};

/// Parsed state of a host document at one version.
#[derive(Debug, Clone)]
pub struct RazorDocumentContext {
    pub syntax_tree: Arc<SyntaxTree>,
    pub tag_helpers: Arc<TagHelperDocumentContext>,
    pub host_document_version: i32,
}

/// Supplies the Razor syntax tree and tag helpers for a host document.
#[async_trait]
pub trait RazorDocumentContextProvider: Send + Sync {
    async fn document_context(&self, host_uri: &Url) -> RouterResult<Option<RazorDocumentContext>>;
}
