//! Tag-helper and component descriptors plus the candidate provider.
//!
//! Descriptors arrive from the Razor project system already resolved for a
//! document; this module only decides which of them apply at a site.

use std::collections::BTreeMap;
use std::sync::Arc;

const BOOLEAN_TYPE_NAMES: &[&str] = &["System.Boolean", "bool"];

fn is_boolean_type(type_name: Option<&str>) -> bool {
    type_name.is_some_and(|name| BOOLEAN_TYPE_NAMES.contains(&name))
}

/// One `[HtmlTargetElement]`-style rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagMatchingRule {
    /// `*` matches any tag.
    pub tag_name: String,
    pub parent_tag: Option<String>,
}

impl TagMatchingRule {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            parent_tag: None,
        }
    }

    pub fn with_parent(mut self, parent_tag: impl Into<String>) -> Self {
        self.parent_tag = Some(parent_tag.into());
        self
    }

    fn is_catch_all(&self) -> bool {
        self.tag_name == "*"
    }

    fn parent_allows(&self, parent_tag: Option<&str>) -> bool {
        match (&self.parent_tag, parent_tag) {
            (None, _) => true,
            (Some(required), Some(actual)) => required.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoundAttributeDescriptor {
    /// Attribute name; empty for dictionary-only attributes.
    pub name: String,
    pub type_name: Option<String>,
    /// Prefix of dictionary-style attributes (`asp-route-`).
    pub indexer_name_prefix: Option<String>,
    pub indexer_type_name: Option<String>,
    /// `@bind`, `@onclick` and friends.
    pub is_directive_attribute: bool,
    pub documentation: Option<String>,
}

impl BoundAttributeDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: Some(type_name.into()),
            ..Default::default()
        }
    }

    pub fn with_indexer(mut self, prefix: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.indexer_name_prefix = Some(prefix.into());
        self.indexer_type_name = Some(type_name.into());
        self
    }

    pub fn directive(mut self) -> Self {
        self.is_directive_attribute = true;
        self
    }

    pub fn is_boolean_property(&self) -> bool {
        is_boolean_type(self.type_name.as_deref())
    }

    pub fn is_boolean_indexer(&self) -> bool {
        is_boolean_type(self.indexer_type_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagHelperDescriptor {
    pub name: String,
    pub documentation: Option<String>,
    pub tag_matching_rules: Vec<TagMatchingRule>,
    pub bound_attributes: Vec<Arc<BoundAttributeDescriptor>>,
    /// Children permitted inside the element; empty means unrestricted.
    pub allowed_child_tags: Vec<String>,
    /// Blazor component rather than an MVC tag helper.
    pub is_component: bool,
}

impl TagHelperDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_rule(mut self, rule: TagMatchingRule) -> Self {
        self.tag_matching_rules.push(rule);
        self
    }

    pub fn with_attribute(mut self, attribute: BoundAttributeDescriptor) -> Self {
        self.bound_attributes.push(Arc::new(attribute));
        self
    }

    pub fn with_allowed_child(mut self, tag: impl Into<String>) -> Self {
        self.allowed_child_tags.push(tag.into());
        self
    }

    pub fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    pub fn binds_directive_attribute(&self) -> bool {
        self.bound_attributes
            .iter()
            .any(|attribute| attribute.is_directive_attribute)
    }

    fn applies_to(&self, prefix: &str, tag_name: &str, parent_tag: Option<&str>) -> bool {
        self.tag_matching_rules.iter().any(|rule| {
            (rule.is_catch_all() || full_tag_name(prefix, &rule.tag_name).eq_ignore_ascii_case(tag_name))
                && rule.parent_allows(parent_tag)
        })
    }
}

fn full_tag_name(prefix: &str, tag_name: &str) -> String {
    format!("{prefix}{tag_name}")
}

/// Tag helpers in scope for one document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TagHelperDocumentContext {
    /// `@tagHelperPrefix`, if the document declares one.
    pub prefix: Option<String>,
    pub tag_helpers: Vec<Arc<TagHelperDescriptor>>,
}

impl TagHelperDocumentContext {
    pub fn new(prefix: Option<String>, tag_helpers: Vec<Arc<TagHelperDescriptor>>) -> Self {
        Self {
            prefix,
            tag_helpers,
        }
    }

    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    /// Same prefix, keeping only the tag helpers `keep` accepts.
    pub fn filtered(&self, keep: impl Fn(&TagHelperDescriptor) -> bool) -> Self {
        Self {
            prefix: self.prefix.clone(),
            tag_helpers: self
                .tag_helpers
                .iter()
                .filter(|descriptor| keep(descriptor))
                .cloned()
                .collect(),
        }
    }
}

/// Inputs for completing a tag name.
#[derive(Debug, Clone)]
pub struct ElementCompletionContext<'a> {
    pub document_context: &'a TagHelperDocumentContext,
    /// The (partial) tag name under the cursor.
    pub containing_tag_name: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub containing_parent_tag_name: Option<String>,
    pub containing_parent_is_tag_helper: bool,
    pub is_html_tag_name: fn(&str) -> bool,
}

/// Inputs for completing an attribute name.
#[derive(Debug, Clone)]
pub struct AttributeCompletionContext<'a> {
    pub document_context: &'a TagHelperDocumentContext,
    /// Name of the attribute under the cursor, if any.
    pub current_attribute_name: Option<String>,
    pub current_tag_name: String,
    pub attributes: Vec<(String, String)>,
    pub current_parent_tag_name: Option<String>,
    pub current_parent_is_tag_helper: bool,
    pub is_html_tag_name: fn(&str) -> bool,
}

/// Tag names mapped to the descriptors offering them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementCompletionResult {
    pub completions: BTreeMap<String, Vec<Arc<TagHelperDescriptor>>>,
}

/// Attribute display names (`asp-route-...` for indexers) mapped to descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeCompletionResult {
    pub completions: BTreeMap<String, Vec<Arc<BoundAttributeDescriptor>>>,
}

/// Computes tag-helper candidates for a completion site.
pub trait TagHelperCompletionProvider: Send + Sync {
    fn element_completions(&self, context: &ElementCompletionContext<'_>) -> ElementCompletionResult;

    fn attribute_completions(
        &self,
        context: &AttributeCompletionContext<'_>,
    ) -> AttributeCompletionResult;
}

/// Rule-based provider over the document's descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTagHelperCompletionProvider;

impl DefaultTagHelperCompletionProvider {
    /// Child tags allowed by tag helpers bound to the parent, if any restrict them.
    fn allowed_children(context: &ElementCompletionContext<'_>) -> Option<Vec<String>> {
        if !context.containing_parent_is_tag_helper {
            return None;
        }
        let parent = context.containing_parent_tag_name.as_deref()?;
        let prefix = context.document_context.prefix();
        let allowed: Vec<String> = context
            .document_context
            .tag_helpers
            .iter()
            .filter(|descriptor| descriptor.applies_to(prefix, parent, None))
            .flat_map(|descriptor| descriptor.allowed_child_tags.iter().cloned())
            .collect();
        (!allowed.is_empty()).then_some(allowed)
    }
}

impl TagHelperCompletionProvider for DefaultTagHelperCompletionProvider {
    fn element_completions(&self, context: &ElementCompletionContext<'_>) -> ElementCompletionResult {
        let prefix = context.document_context.prefix();
        let parent = context.containing_parent_tag_name.as_deref();
        let allowed_children = Self::allowed_children(context);
        let mut result = ElementCompletionResult::default();

        for descriptor in &context.document_context.tag_helpers {
            for rule in &descriptor.tag_matching_rules {
                if rule.is_catch_all() || (context.is_html_tag_name)(&rule.tag_name) {
                    continue;
                }
                if !rule.parent_allows(parent) {
                    continue;
                }
                if let Some(allowed) = &allowed_children
                    && !allowed
                        .iter()
                        .any(|child| child.eq_ignore_ascii_case(&rule.tag_name))
                {
                    continue;
                }
                let entry = result
                    .completions
                    .entry(full_tag_name(prefix, &rule.tag_name))
                    .or_default();
                if !entry.iter().any(|existing| Arc::ptr_eq(existing, descriptor)) {
                    entry.push(Arc::clone(descriptor));
                }
            }
        }

        result
    }

    fn attribute_completions(
        &self,
        context: &AttributeCompletionContext<'_>,
    ) -> AttributeCompletionResult {
        let prefix = context.document_context.prefix();
        let parent = context.current_parent_tag_name.as_deref();
        let is_present = |name: &str| {
            context.attributes.iter().any(|(existing, _)| {
                existing.eq_ignore_ascii_case(name)
                    && context
                        .current_attribute_name
                        .as_deref()
                        .is_none_or(|current| !current.eq_ignore_ascii_case(name))
            })
        };
        let mut result = AttributeCompletionResult::default();

        for descriptor in &context.document_context.tag_helpers {
            if !descriptor.applies_to(prefix, &context.current_tag_name, parent) {
                continue;
            }
            for attribute in &descriptor.bound_attributes {
                if !attribute.name.is_empty() && !is_present(&attribute.name) {
                    result
                        .completions
                        .entry(attribute.name.clone())
                        .or_default()
                        .push(Arc::clone(attribute));
                }
                if let Some(indexer_prefix) = &attribute.indexer_name_prefix {
                    result
                        .completions
                        .entry(format!("{indexer_prefix}..."))
                        .or_default()
                        .push(Arc::clone(attribute));
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::html_facts::is_html_tag_name;

    fn document_context(tag_helpers: Vec<TagHelperDescriptor>) -> TagHelperDocumentContext {
        TagHelperDocumentContext::new(None, tag_helpers.into_iter().map(Arc::new).collect())
    }

    fn element_context<'a>(
        document_context: &'a TagHelperDocumentContext,
        parent: Option<&str>,
        parent_is_tag_helper: bool,
    ) -> ElementCompletionContext<'a> {
        ElementCompletionContext {
            document_context,
            containing_tag_name: None,
            attributes: Vec::new(),
            containing_parent_tag_name: parent.map(str::to_string),
            containing_parent_is_tag_helper: parent_is_tag_helper,
            is_html_tag_name,
        }
    }

    fn attribute_context<'a>(
        document_context: &'a TagHelperDocumentContext,
        tag: &str,
        attributes: &[(&str, &str)],
        current: Option<&str>,
    ) -> AttributeCompletionContext<'a> {
        AttributeCompletionContext {
            document_context,
            current_attribute_name: current.map(str::to_string),
            current_tag_name: tag.to_string(),
            attributes: attributes
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            current_parent_tag_name: None,
            current_parent_is_tag_helper: false,
            is_html_tag_name,
        }
    }

    #[test]
    fn element_completions_skip_html_and_catch_all_rules() {
        let context = document_context(vec![
            TagHelperDescriptor::new("Counter").with_rule(TagMatchingRule::new("Counter")),
            TagHelperDescriptor::new("AnchorTagHelper").with_rule(TagMatchingRule::new("a")),
            TagHelperDescriptor::new("Everything").with_rule(TagMatchingRule::new("*")),
        ]);

        let result = DefaultTagHelperCompletionProvider
            .element_completions(&element_context(&context, None, false));

        assert_eq!(result.completions.keys().collect::<Vec<_>>(), vec!["Counter"]);
    }

    #[test]
    fn element_completions_respect_parent_rules_and_prefix() {
        let context = TagHelperDocumentContext::new(
            Some("th:".to_string()),
            vec![
                Arc::new(
                    TagHelperDescriptor::new("Row")
                        .with_rule(TagMatchingRule::new("row").with_parent("grid")),
                ),
                Arc::new(TagHelperDescriptor::new("Grid").with_rule(TagMatchingRule::new("grid"))),
            ],
        );

        let outside = DefaultTagHelperCompletionProvider
            .element_completions(&element_context(&context, Some("div"), false));
        let inside = DefaultTagHelperCompletionProvider
            .element_completions(&element_context(&context, Some("grid"), false));

        assert!(outside.completions.contains_key("th:grid"));
        assert!(!outside.completions.contains_key("th:row"));
        assert!(inside.completions.contains_key("th:row"));
    }

    #[test]
    fn element_completions_honor_allowed_children_of_tag_helper_parent() {
        let context = document_context(vec![
            TagHelperDescriptor::new("Tabs")
                .with_rule(TagMatchingRule::new("tabs"))
                .with_allowed_child("tab"),
            TagHelperDescriptor::new("Tab").with_rule(TagMatchingRule::new("tab")),
            TagHelperDescriptor::new("Card").with_rule(TagMatchingRule::new("card")),
        ]);

        let result = DefaultTagHelperCompletionProvider
            .element_completions(&element_context(&context, Some("tabs"), true));

        assert_eq!(result.completions.keys().collect::<Vec<_>>(), vec!["tab"]);
    }

    #[test]
    fn attribute_completions_exclude_present_attributes_but_keep_the_current_one() {
        let context = document_context(vec![
            TagHelperDescriptor::new("MyComponent")
                .with_rule(TagMatchingRule::new("my-component"))
                .with_attribute(BoundAttributeDescriptor::new("foo", "System.Int32"))
                .with_attribute(BoundAttributeDescriptor::new("bar", "System.String"))
                .with_attribute(BoundAttributeDescriptor::new("baz", "System.Boolean")),
        ]);

        let result = DefaultTagHelperCompletionProvider.attribute_completions(&attribute_context(
            &context,
            "my-component",
            &[("foo", "1"), ("bar", "")],
            Some("bar"),
        ));

        assert_eq!(
            result.completions.keys().collect::<Vec<_>>(),
            vec!["bar", "baz"]
        );
    }

    #[test]
    fn attribute_completions_offer_indexer_prefixes() {
        let context = document_context(vec![
            TagHelperDescriptor::new("AnchorTagHelper")
                .with_rule(TagMatchingRule::new("a"))
                .with_attribute(
                    BoundAttributeDescriptor::new("asp-all-route-data", "IDictionary")
                        .with_indexer("asp-route-", "System.String"),
                ),
        ]);

        let result = DefaultTagHelperCompletionProvider
            .attribute_completions(&attribute_context(&context, "A", &[], None));

        assert_eq!(
            result.completions.keys().collect::<Vec<_>>(),
            vec!["asp-all-route-data", "asp-route-..."]
        );
    }

    #[test]
    fn attribute_completions_ignore_tag_helpers_for_other_tags() {
        let context = document_context(vec![
            TagHelperDescriptor::new("FormTagHelper")
                .with_rule(TagMatchingRule::new("form"))
                .with_attribute(BoundAttributeDescriptor::new("asp-action", "System.String")),
        ]);

        let result = DefaultTagHelperCompletionProvider
            .attribute_completions(&attribute_context(&context, "div", &[], None));

        assert!(result.completions.is_empty());
    }

    #[test]
    fn filtered_keeps_prefix() {
        let context = TagHelperDocumentContext::new(
            Some("x:".to_string()),
            vec![
                Arc::new(
                    TagHelperDescriptor::new("Bind")
                        .with_rule(TagMatchingRule::new("*"))
                        .with_attribute(BoundAttributeDescriptor::new("@bind", "object").directive()),
                ),
                Arc::new(TagHelperDescriptor::new("Plain").with_rule(TagMatchingRule::new("plain"))),
            ],
        );

        let filtered = context.filtered(|descriptor| !descriptor.binds_directive_attribute());

        assert_eq!(filtered.prefix(), "x:");
        assert_eq!(filtered.tag_helpers.len(), 1);
        assert_eq!(filtered.tag_helpers[0].name, "Plain");
    }
}
