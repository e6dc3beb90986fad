//! Settings management for the router.
//!
//! `SettingsManager` consolidates workspace settings, client capabilities and
//! the workspace root into one struct shared by every handler.
//!
//! # Initialization Lifecycle
//!
//! - `client_capabilities`: set once via `set_capabilities()`
//! - `root_path`: set via `set_root_path()`
//! - `settings`: replaced via `apply_settings()` on configuration changes

use arc_swap::ArcSwap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tower_lsp_server::ls_types::ClientCapabilities;

use crate::config::WorkspaceSettings;

/// Thread-safe holder of configuration state.
///
/// - `ArcSwap` for atomic updates to settings and root_path
/// - `OnceLock` for one-time initialization of capabilities
pub(crate) struct SettingsManager {
    root_path: ArcSwap<Option<PathBuf>>,
    settings: ArcSwap<WorkspaceSettings>,
    client_capabilities: OnceLock<ClientCapabilities>,
}

impl std::fmt::Debug for SettingsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsManager")
            .field("root_path", &self.root_path.load())
            .field("settings", &self.settings.load())
            .field("client_capabilities", &self.client_capabilities.get().is_some())
            .finish()
    }
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsManager {
    pub(crate) fn new() -> Self {
        Self {
            root_path: ArcSwap::new(Arc::new(None)),
            settings: ArcSwap::new(Arc::new(WorkspaceSettings::default())),
            client_capabilities: OnceLock::new(),
        }
    }

    /// Store client capabilities from initialize().
    ///
    /// Subsequent calls are ignored (OnceLock semantics).
    pub(crate) fn set_capabilities(&self, caps: ClientCapabilities) {
        let _ = self.client_capabilities.set(caps);
    }

    #[cfg(test)]
    pub(crate) fn client_capabilities(&self) -> Option<&ClientCapabilities> {
        self.client_capabilities.get()
    }

    pub(crate) fn set_root_path(&self, path: Option<PathBuf>) {
        self.root_path.store(Arc::new(path));
    }

    pub(crate) fn root_path(&self) -> Arc<Option<PathBuf>> {
        self.root_path.load_full()
    }

    pub(crate) fn load_settings(&self) -> Arc<WorkspaceSettings> {
        self.settings.load_full()
    }

    pub(crate) fn apply_settings(&self, settings: WorkspaceSettings) {
        self.settings.store(Arc::new(settings));
    }

    /// Returns true if client declared textDocument.completion.completionItem.snippetSupport.
    /// Returns false if initialize() hasn't been called yet.
    pub(crate) fn supports_completion_snippets(&self) -> bool {
        self.client_capabilities
            .get()
            .and_then(|caps| caps.text_document.as_ref())
            .and_then(|td| td.completion.as_ref())
            .and_then(|completion| completion.completion_item.as_ref())
            .and_then(|item| item.snippet_support)
            .unwrap_or(false)
    }

    /// Returns true if client declared textDocument.definition.linkSupport.
    ///
    /// When false, LocationLink results are downgraded to Location.
    pub(crate) fn supports_definition_link(&self) -> bool {
        self.client_capabilities
            .get()
            .and_then(|caps| caps.text_document.as_ref())
            .and_then(|td| td.definition.as_ref())
            .and_then(|def| def.link_support)
            .unwrap_or(false)
    }
}
