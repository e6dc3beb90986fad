//! Read-only Razor markup tree consumed by the completion engine.
//!
//! The tree is produced by the Razor parser; only the shapes the completion
//! engine inspects are modelled here.

/// Byte span in the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `start <= position < end`
    pub fn contains(&self, position: usize) -> bool {
        self.start <= position && position < self.end
    }

    /// `start <= position <= end`; a cursor right after the span still touches it.
    pub fn intersects(&self, position: usize) -> bool {
        self.start <= position && position <= self.end
    }
}

/// Attribute-like nodes inside a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeNode {
    /// `class="x"`
    Markup { name: String, value: String },
    /// `disabled`
    MinimizedMarkup { name: String },
    /// `asp-for="Model.Name"` bound to a tag helper
    TagHelper { name: String, value: String },
    /// `asp-validation-summary` bound to a tag helper, no value
    MinimizedTagHelper { name: String },
    /// `@bind:format="yyyy"`; `name` includes the `@` transition
    Directive {
        name: String,
        parameter: Option<String>,
        value: String,
    },
    /// `@bind` without a value
    MinimizedDirective {
        name: String,
        parameter: Option<String>,
    },
}

impl AttributeNode {
    /// The attribute's name and value as written; minimized attributes have `""`.
    pub fn name_value(&self) -> (String, String) {
        match self {
            AttributeNode::Markup { name, value } | AttributeNode::TagHelper { name, value } => {
                (name.clone(), value.clone())
            }
            AttributeNode::MinimizedMarkup { name }
            | AttributeNode::MinimizedTagHelper { name } => (name.clone(), String::new()),
            AttributeNode::Directive {
                name,
                parameter,
                value,
            } => (directive_full_name(name, parameter.as_deref()), value.clone()),
            AttributeNode::MinimizedDirective { name, parameter } => {
                (directive_full_name(name, parameter.as_deref()), String::new())
            }
        }
    }

    pub fn name(&self) -> String {
        self.name_value().0
    }

    /// Whether the attribute was written with `=` and a value.
    pub fn has_value(&self) -> bool {
        matches!(
            self,
            AttributeNode::Markup { .. }
                | AttributeNode::TagHelper { .. }
                | AttributeNode::Directive { .. }
        )
    }
}

fn directive_full_name(name: &str, parameter: Option<&str>) -> String {
    match parameter {
        Some(parameter) => format!("{name}:{parameter}"),
        None => name.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxKind {
    Document,
    /// A markup element; `tag_helper` is set when the element is bound to a
    /// tag helper or component.
    Element { tag_helper: bool },
    StartTag {
        name: String,
        name_span: TextSpan,
        /// From the end of the name to the tag close (or end of tag when unterminated).
        attributes_span: TextSpan,
    },
    EndTag { name: String },
    /// The node span includes leading whitespace; `name_span` covers only
    /// the name as written.
    Attribute {
        attribute: AttributeNode,
        name_span: TextSpan,
    },
    Text,
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    pub span: TextSpan,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: SyntaxKind, span: TextSpan, children: Vec<SyntaxNode>) -> Self {
        Self {
            kind,
            span,
            children,
        }
    }

    /// The start tag of an element node.
    pub fn start_tag(&self) -> Option<&SyntaxNode> {
        match self.kind {
            SyntaxKind::Element { .. } => self
                .children
                .iter()
                .find(|child| matches!(child.kind, SyntaxKind::StartTag { .. })),
            _ => None,
        }
    }

    /// Tag name of an element (via its start tag) or of a start tag.
    pub fn tag_name(&self) -> Option<&str> {
        match &self.kind {
            SyntaxKind::StartTag { name, .. } => Some(name),
            SyntaxKind::Element { .. } => self.start_tag().and_then(SyntaxNode::tag_name),
            _ => None,
        }
    }

    /// Attribute children of a start tag.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeNode> {
        self.children.iter().filter_map(|child| match &child.kind {
            SyntaxKind::Attribute { attribute, .. } => Some(attribute),
            _ => None,
        })
    }
}

/// A parsed Razor document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    root: SyntaxNode,
}

impl SyntaxTree {
    pub fn new(root: SyntaxNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &SyntaxNode {
        &self.root
    }

    /// Path from the root to the smallest node owning `offset`.
    ///
    /// A child owns the offset when it contains it; failing that, a child
    /// ending exactly at the offset does (the cursor sits right after it).
    pub fn locate_owner(&self, offset: usize) -> Vec<&SyntaxNode> {
        let mut path = vec![&self.root];
        let mut current = &self.root;
        loop {
            let next = current
                .children
                .iter()
                .find(|child| child.span.contains(offset))
                .or_else(|| {
                    current
                        .children
                        .iter()
                        .find(|child| child.span.end == offset && !child.span.is_empty())
                });
            match next {
                Some(child) => {
                    path.push(child);
                    current = child;
                }
                None => return path,
            }
        }
    }
}
