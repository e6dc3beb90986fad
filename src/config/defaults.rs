//! Default configuration values for razor-router.

use super::settings::{ContentTypesConfig, RouterConfig};

pub const DEFAULT_SYNCHRONIZATION_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_PROGRESS_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_COMPLETION_CACHE_CAPACITY: usize = 10;
pub const DEFAULT_HTML_CONTENT_TYPE: &str = "html";
pub const DEFAULT_CSHARP_CONTENT_TYPE: &str = "csharp";

/// The lowest-precedence configuration layer.
pub fn default_settings() -> RouterConfig {
    RouterConfig {
        synchronization_timeout_ms: Some(DEFAULT_SYNCHRONIZATION_TIMEOUT_MS),
        request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
        progress_timeout_ms: Some(DEFAULT_PROGRESS_TIMEOUT_MS),
        completion_cache_capacity: Some(DEFAULT_COMPLETION_CACHE_CAPACITY),
        log_level: None,
        content_types: Some(ContentTypesConfig {
            html: Some(vec![DEFAULT_HTML_CONTENT_TYPE.to_string()]),
            csharp: Some(vec![DEFAULT_CSHARP_CONTENT_TYPE.to_string()]),
        }),
    }
}
