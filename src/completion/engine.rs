//! Completion candidates for tag-helper elements and attributes.
//!
//! The engine looks at the Razor markup tree around the cursor, decides
//! whether the cursor sits on a tag name or inside a tag's attribute list,
//! and turns the provider's candidates into completion items.

use std::sync::Arc;

use tower_lsp_server::ls_types::{
    CompletionItem, CompletionItemKind, Documentation, InsertTextFormat,
};

use super::html_facts::is_html_tag_name;
use super::syntax::{AttributeNode, SyntaxKind, SyntaxNode, SyntaxTree};
use super::tag_helper::{
    AttributeCompletionContext, BoundAttributeDescriptor, DefaultTagHelperCompletionProvider,
    ElementCompletionContext, TagHelperCompletionProvider, TagHelperDescriptor,
    TagHelperDocumentContext,
};

const ELEMENT_COMMIT_CHARACTERS: &[&str] = &[" ", ">"];
const BOOLEAN_ATTRIBUTE_COMMIT_CHARACTERS: &[&str] = &["=", " "];
const ATTRIBUTE_COMMIT_CHARACTERS: &[&str] = &["="];
const INDEXER_SUFFIX: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RazorCompletionItemKind {
    TagHelperElement,
    TagHelperAttribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RazorCompletionItem {
    pub display_text: String,
    pub insert_text: String,
    pub kind: RazorCompletionItemKind,
    pub is_snippet: bool,
    pub commit_characters: Vec<String>,
    pub documentation: Vec<String>,
}

impl RazorCompletionItem {
    pub fn to_completion_item(&self) -> CompletionItem {
        let documentation = (!self.documentation.is_empty())
            .then(|| Documentation::String(self.documentation.join("\n\n")));
        CompletionItem {
            label: self.display_text.clone(),
            kind: Some(match self.kind {
                RazorCompletionItemKind::TagHelperElement => CompletionItemKind::TYPE_PARAMETER,
                RazorCompletionItemKind::TagHelperAttribute => CompletionItemKind::PROPERTY,
            }),
            insert_text: Some(self.insert_text.clone()),
            insert_text_format: Some(if self.is_snippet {
                InsertTextFormat::SNIPPET
            } else {
                InsertTextFormat::PLAIN_TEXT
            }),
            commit_characters: (!self.commit_characters.is_empty())
                .then(|| self.commit_characters.clone()),
            documentation,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionOptions {
    pub snippets_supported: bool,
}

/// Produces tag-helper completion items for a cursor offset.
pub struct CompletionCandidateEngine {
    provider: Arc<dyn TagHelperCompletionProvider>,
}

impl Default for CompletionCandidateEngine {
    fn default() -> Self {
        Self::new(Arc::new(DefaultTagHelperCompletionProvider))
    }
}

impl std::fmt::Debug for CompletionCandidateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionCandidateEngine").finish_non_exhaustive()
    }
}

/// Cursor position relative to the attribute node it falls in.
#[derive(Debug, PartialEq, Eq)]
enum AttributeCursor {
    /// Whitespace between attributes, or no attribute at all.
    Between,
    /// On the attribute's name, end inclusive.
    Name(String),
    /// Past the name of an attribute that has a value.
    Value,
}

/// Where the cursor sits relative to the enclosing start tag.
struct TagSite<'t> {
    start_tag: &'t SyntaxNode,
    /// Attribute node under the cursor, when there is one.
    attribute: Option<&'t SyntaxNode>,
    /// Nearest enclosing element outside the tag's own element.
    ancestor: Option<&'t SyntaxNode>,
}

impl<'t> TagSite<'t> {
    fn locate(tree: &'t SyntaxTree, offset: usize) -> Option<Self> {
        let path = tree.locate_owner(offset);
        let (owner_index, owner) = path.iter().enumerate().last()?;
        let (tag_index, attribute) = match owner.kind {
            SyntaxKind::StartTag { .. } => (owner_index, None),
            SyntaxKind::Attribute { .. } => {
                let parent_index = owner_index.checked_sub(1)?;
                if !matches!(path[parent_index].kind, SyntaxKind::StartTag { .. }) {
                    return None;
                }
                (parent_index, Some(*owner))
            }
            _ => return None,
        };
        // path[tag_index - 1] is the tag's own element.
        let ancestor = path[..tag_index.saturating_sub(1)]
            .iter()
            .rev()
            .find(|node| matches!(node.kind, SyntaxKind::Element { .. }))
            .copied();
        Some(Self {
            start_tag: path[tag_index],
            attribute,
            ancestor,
        })
    }

    fn attributes(&self) -> Vec<(String, String)> {
        self.start_tag
            .attributes()
            .map(AttributeNode::name_value)
            .collect()
    }

    fn ancestor_tag_name(&self) -> Option<String> {
        self.ancestor
            .and_then(SyntaxNode::tag_name)
            .map(str::to_string)
    }

    fn ancestor_is_tag_helper(&self) -> bool {
        matches!(
            self.ancestor.map(|node| &node.kind),
            Some(SyntaxKind::Element { tag_helper: true })
        )
    }

    fn attribute_cursor(&self, offset: usize) -> AttributeCursor {
        let Some(SyntaxKind::Attribute {
            attribute,
            name_span,
        }) = self.attribute.map(|node| &node.kind)
        else {
            return AttributeCursor::Between;
        };
        if name_span.intersects(offset) {
            AttributeCursor::Name(attribute.name())
        } else if offset > name_span.end && attribute.has_value() {
            AttributeCursor::Value
        } else {
            AttributeCursor::Between
        }
    }
}

impl CompletionCandidateEngine {
    pub fn new(provider: Arc<dyn TagHelperCompletionProvider>) -> Self {
        Self { provider }
    }

    /// Completion items for `offset` (a byte offset into the host document).
    pub fn completions(
        &self,
        tree: &SyntaxTree,
        document_context: &TagHelperDocumentContext,
        offset: usize,
        options: CompletionOptions,
    ) -> Vec<RazorCompletionItem> {
        let Some(site) = TagSite::locate(tree, offset) else {
            return Vec::new();
        };
        let SyntaxKind::StartTag {
            name,
            name_span,
            attributes_span,
        } = &site.start_tag.kind
        else {
            return Vec::new();
        };

        // Attribute nodes start where the name ends, so the name wins at
        // that boundary.
        if name_span.intersects(offset) {
            log::debug!(
                target: "razor_router::completion",
                "Element completion at {} for <{}>",
                offset,
                name
            );
            return self.element_completions(&site, name, document_context);
        }

        if attributes_span.intersects(offset) {
            let current_attribute = match site.attribute_cursor(offset) {
                AttributeCursor::Value => return Vec::new(),
                AttributeCursor::Name(name) => Some(name),
                AttributeCursor::Between => None,
            };
            log::debug!(
                target: "razor_router::completion",
                "Attribute completion at {} for <{}>",
                offset,
                name
            );
            return self.attribute_completions(
                &site,
                name,
                current_attribute,
                document_context,
                options,
            );
        }

        Vec::new()
    }

    fn element_completions(
        &self,
        site: &TagSite<'_>,
        tag_name: &str,
        document_context: &TagHelperDocumentContext,
    ) -> Vec<RazorCompletionItem> {
        let context = ElementCompletionContext {
            document_context,
            containing_tag_name: Some(tag_name.to_string()),
            attributes: site.attributes(),
            containing_parent_tag_name: site.ancestor_tag_name(),
            containing_parent_is_tag_helper: site.ancestor_is_tag_helper(),
            is_html_tag_name,
        };
        let result = self.provider.element_completions(&context);

        result
            .completions
            .into_iter()
            .map(|(display_text, descriptors)| RazorCompletionItem {
                insert_text: display_text.clone(),
                display_text,
                kind: RazorCompletionItemKind::TagHelperElement,
                is_snippet: false,
                commit_characters: to_strings(ELEMENT_COMMIT_CHARACTERS),
                documentation: element_documentation(&descriptors),
            })
            .collect()
    }

    fn attribute_completions(
        &self,
        site: &TagSite<'_>,
        tag_name: &str,
        current_attribute: Option<String>,
        document_context: &TagHelperDocumentContext,
        options: CompletionOptions,
    ) -> Vec<RazorCompletionItem> {
        // Directive attributes have their own completion source.
        let filtered = document_context.filtered(|descriptor| !descriptor.binds_directive_attribute());
        let context = AttributeCompletionContext {
            document_context: &filtered,
            current_attribute_name: current_attribute,
            current_tag_name: tag_name.to_string(),
            attributes: site.attributes(),
            current_parent_tag_name: site.ancestor_tag_name(),
            current_parent_is_tag_helper: site.ancestor_is_tag_helper(),
            is_html_tag_name,
        };
        let result = self.provider.attribute_completions(&context);

        result
            .completions
            .into_iter()
            .map(|(display_text, descriptors)| {
                let insertion = attribute_insertion(&display_text, &descriptors, options);
                RazorCompletionItem {
                    display_text,
                    insert_text: insertion.text,
                    kind: RazorCompletionItemKind::TagHelperAttribute,
                    is_snippet: insertion.is_snippet,
                    commit_characters: insertion.commit_characters,
                    documentation: attribute_documentation(&descriptors),
                }
            })
            .collect()
    }
}

struct AttributeInsertion {
    text: String,
    is_snippet: bool,
    commit_characters: Vec<String>,
}

fn attribute_insertion(
    display_text: &str,
    descriptors: &[Arc<BoundAttributeDescriptor>],
    options: CompletionOptions,
) -> AttributeInsertion {
    if let Some(prefix) = display_text.strip_suffix(INDEXER_SUFFIX) {
        let all_boolean = descriptors.iter().all(|d| d.is_boolean_indexer());
        let snippet = options.snippets_supported && !all_boolean;
        return AttributeInsertion {
            text: if snippet {
                format!("{prefix}$1=\"$2\"")
            } else {
                prefix.to_string()
            },
            is_snippet: snippet,
            commit_characters: Vec::new(),
        };
    }

    if descriptors.iter().all(|d| d.is_boolean_property()) {
        return AttributeInsertion {
            text: display_text.to_string(),
            is_snippet: false,
            commit_characters: to_strings(BOOLEAN_ATTRIBUTE_COMMIT_CHARACTERS),
        };
    }

    AttributeInsertion {
        text: if options.snippets_supported {
            format!("{display_text}=\"$1\"")
        } else {
            display_text.to_string()
        },
        is_snippet: options.snippets_supported,
        commit_characters: to_strings(ATTRIBUTE_COMMIT_CHARACTERS),
    }
}

fn element_documentation(descriptors: &[Arc<TagHelperDescriptor>]) -> Vec<String> {
    descriptors
        .iter()
        .filter_map(|d| d.documentation.clone())
        .collect()
}

fn attribute_documentation(descriptors: &[Arc<BoundAttributeDescriptor>]) -> Vec<String> {
    descriptors
        .iter()
        .filter_map(|d| d.documentation.clone())
        .collect()
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
