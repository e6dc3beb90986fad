pub mod defaults;
pub mod settings;
pub mod user;

use std::collections::HashMap;
use std::time::Duration;

use crate::document::LanguageKind;

pub use settings::{ContentTypesConfig, RouterConfig};
pub use user::{UserConfigError, UserConfigResult, load_user_config, user_config_path};

/// Merge multiple RouterConfig layers in order.
/// Later configs in the slice have higher precedence (override earlier ones).
/// Use this for layered config: `merge_all(&[defaults, user, project, session])`
pub fn merge_all(configs: &[Option<RouterConfig>]) -> Option<RouterConfig> {
    configs.iter().cloned().reduce(merge_settings).flatten()
}

/// Merge two RouterConfig layers, preferring values from `primary` over `fallback`
pub fn merge_settings(
    fallback: Option<RouterConfig>,
    primary: Option<RouterConfig>,
) -> Option<RouterConfig> {
    match (fallback, primary) {
        (None, None) => None,
        (Some(settings), None) => Some(settings),
        (None, Some(settings)) => Some(settings),
        (Some(fallback), Some(primary)) => Some(RouterConfig {
            synchronization_timeout_ms: primary
                .synchronization_timeout_ms
                .or(fallback.synchronization_timeout_ms),
            request_timeout_ms: primary.request_timeout_ms.or(fallback.request_timeout_ms),
            progress_timeout_ms: primary.progress_timeout_ms.or(fallback.progress_timeout_ms),
            completion_cache_capacity: primary
                .completion_cache_capacity
                .or(fallback.completion_cache_capacity),
            log_level: primary.log_level.or(fallback.log_level),
            content_types: merge_content_types(fallback.content_types, primary.content_types),
        }),
    }
}

fn merge_content_types(
    fallback: Option<ContentTypesConfig>,
    primary: Option<ContentTypesConfig>,
) -> Option<ContentTypesConfig> {
    match (fallback, primary) {
        (None, primary) => primary,
        (fallback, None) => fallback,
        (Some(fallback), Some(primary)) => Some(ContentTypesConfig {
            html: primary.html.or(fallback.html),
            csharp: primary.csharp.or(fallback.csharp),
        }),
    }
}

/// Fully resolved settings used by the running router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub synchronization_timeout: Duration,
    pub request_timeout: Duration,
    pub progress_timeout: Duration,
    pub completion_cache_capacity: usize,
    pub log_level: Option<String>,
    pub content_types: HashMap<LanguageKind, Vec<String>>,
}

impl WorkspaceSettings {
    /// Content types whose servers handle virtual documents of `kind`.
    pub fn content_types_for(&self, kind: LanguageKind) -> &[String] {
        self.content_types
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        WorkspaceSettings::from(defaults::default_settings())
    }
}

impl From<&RouterConfig> for WorkspaceSettings {
    fn from(config: &RouterConfig) -> Self {
        let content_types = config.content_types.clone().unwrap_or_default();
        let mut resolved = HashMap::new();
        resolved.insert(
            LanguageKind::Html,
            content_types
                .html
                .unwrap_or_else(|| vec![defaults::DEFAULT_HTML_CONTENT_TYPE.to_string()]),
        );
        resolved.insert(
            LanguageKind::CSharp,
            content_types
                .csharp
                .unwrap_or_else(|| vec![defaults::DEFAULT_CSHARP_CONTENT_TYPE.to_string()]),
        );

        Self {
            synchronization_timeout: Duration::from_millis(
                config
                    .synchronization_timeout_ms
                    .unwrap_or(defaults::DEFAULT_SYNCHRONIZATION_TIMEOUT_MS),
            ),
            request_timeout: Duration::from_millis(
                config
                    .request_timeout_ms
                    .unwrap_or(defaults::DEFAULT_REQUEST_TIMEOUT_MS),
            ),
            progress_timeout: Duration::from_millis(
                config
                    .progress_timeout_ms
                    .unwrap_or(defaults::DEFAULT_PROGRESS_TIMEOUT_MS),
            ),
            // A zero-capacity cache could never answer a resolve
            completion_cache_capacity: config
                .completion_cache_capacity
                .unwrap_or(defaults::DEFAULT_COMPLETION_CACHE_CAPACITY)
                .max(1),
            log_level: config.log_level.clone(),
            content_types: resolved,
        }
    }
}

impl From<RouterConfig> for WorkspaceSettings {
    fn from(config: RouterConfig) -> Self {
        WorkspaceSettings::from(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_layer_overrides_fallback_field_by_field() {
        let fallback = RouterConfig {
            request_timeout_ms: Some(100),
            synchronization_timeout_ms: Some(200),
            ..Default::default()
        };
        let primary = RouterConfig {
            request_timeout_ms: Some(300),
            ..Default::default()
        };

        let merged = merge_settings(Some(fallback), Some(primary)).unwrap();

        assert_eq!(merged.request_timeout_ms, Some(300));
        assert_eq!(merged.synchronization_timeout_ms, Some(200));
    }

    #[test]
    fn content_types_merge_per_language() {
        let merged = merge_all(&[
            Some(defaults::default_settings()),
            None,
            Some(RouterConfig {
                content_types: Some(ContentTypesConfig {
                    html: None,
                    csharp: Some(vec!["roslyn".to_string()]),
                }),
                ..Default::default()
            }),
        ])
        .unwrap();

        let settings = WorkspaceSettings::from(merged);
        assert_eq!(settings.content_types_for(LanguageKind::Html), ["html".to_string()]);
        assert_eq!(settings.content_types_for(LanguageKind::CSharp), ["roslyn".to_string()]);
        assert!(settings.content_types_for(LanguageKind::Razor).is_empty());
    }

    #[test]
    fn merge_all_of_nothing_is_none() {
        assert!(merge_all(&[None, None]).is_none());
    }

    #[test]
    fn resolved_settings_use_defaults_for_missing_fields() {
        let settings = WorkspaceSettings::from(RouterConfig::default());
        assert_eq!(settings.synchronization_timeout, Duration::from_millis(2000));
        assert_eq!(settings.request_timeout, Duration::from_millis(5000));
        assert_eq!(settings.completion_cache_capacity, 10);
    }

    #[test]
    fn zero_cache_capacity_is_raised_to_one() {
        let settings = WorkspaceSettings::from(RouterConfig {
            completion_cache_capacity: Some(0),
            ..Default::default()
        });
        assert_eq!(settings.completion_cache_capacity, 1);
    }
}
