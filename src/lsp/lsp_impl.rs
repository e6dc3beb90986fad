//! The editor-facing router.
//!
//! `RazorRouter` owns one instance of every service (store, synchronizer,
//! projection, request router, coordinate mapper, progress correlator,
//! completion cache and completion engine). Handlers for individual LSP
//! methods live in `text_document/`; this file holds construction,
//! configuration and the document lifecycle.

mod projection_context;
mod text_document;

use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Value, json};
use tower_lsp_server::ls_types::{
    CompletionOptions as LspCompletionOptions, DiagnosticOptions, DiagnosticServerCapabilities,
    DidChangeConfigurationParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DocumentOnTypeFormattingOptions, HoverProviderCapability,
    InitializeParams, InitializeResult, LinkedEditingRangeServerCapabilities, OneOf,
    ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind, Uri,
};
use url::Url;

use crate::completion::{
    CompletionCandidateEngine, RazorDocumentContextProvider, TagHelperCompletionProvider,
};
use crate::config::WorkspaceSettings;
use crate::document::{
    DocumentSynchronizer, LanguageKind, VirtualDocumentSnapshot, VirtualDocumentStore,
    VirtualDocumentUpdate,
};
use crate::error::{RouterError, RouterResult};
use crate::logging;

use super::bridge::{LanguageServerEndpoint, RequestRouter};
use super::completion_cache::CompletionRequestContextCache;
use super::mapping::{CoordinateMapper, DocumentMappingService};
use super::progress::ProgressCorrelator;
use super::projection::{LanguageClassifier, ProjectionResolver};
use super::settings::{SettingsEventKind, SettingsLoadOutcome, SettingsSource, load_settings};
use super::settings_manager::SettingsManager;

const LOG_TARGET: &str = "razor_router::lifecycle";

/// Convert an `ls_types::Uri` into the `url::Url` used internally.
pub(crate) fn uri_to_url(uri: &Uri) -> Result<Url, url::ParseError> {
    Url::parse(uri.as_str())
}

/// Convert an internal `url::Url` back into an `ls_types::Uri`.
pub(crate) fn url_to_uri(url: &Url) -> RouterResult<Uri> {
    Uri::from_str(url.as_str())
        .map_err(|_| RouterError::internal(format!("{} is not a valid LSP URI", url)))
}

pub struct RazorRouter {
    store: Arc<VirtualDocumentStore>,
    synchronizer: Arc<DocumentSynchronizer>,
    projection: ProjectionResolver,
    router: RequestRouter,
    mapper: CoordinateMapper,
    progress: ProgressCorrelator,
    completion_cache: CompletionRequestContextCache,
    completion_engine: CompletionCandidateEngine,
    document_context: Option<Arc<dyn RazorDocumentContextProvider>>,
    settings_manager: SettingsManager,
}

impl std::fmt::Debug for RazorRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorRouter")
            .field("documents", &self.store.len())
            .field("settings_manager", &self.settings_manager)
            .finish_non_exhaustive()
    }
}

impl RazorRouter {
    pub fn new(
        classifier: Arc<dyn LanguageClassifier>,
        mapping_service: Arc<dyn DocumentMappingService>,
    ) -> Self {
        let store = Arc::new(VirtualDocumentStore::new());
        let synchronizer = Arc::new(DocumentSynchronizer::new(Arc::clone(&store)));
        let router = Self {
            projection: ProjectionResolver::new(classifier, Arc::clone(&synchronizer)),
            mapper: CoordinateMapper::new(mapping_service, Arc::clone(&store)),
            router: RequestRouter::new(),
            progress: ProgressCorrelator::new(),
            completion_cache: CompletionRequestContextCache::default(),
            completion_engine: CompletionCandidateEngine::default(),
            document_context: None,
            settings_manager: SettingsManager::new(),
            store,
            synchronizer,
        };
        router.apply_settings(WorkspaceSettings::default());
        router
    }

    /// Merge tag-helper candidates from `provider` into HTML completion.
    pub fn with_document_context(mut self, provider: Arc<dyn RazorDocumentContextProvider>) -> Self {
        self.document_context = Some(provider);
        self
    }

    /// Replace the default tag-helper candidate provider.
    pub fn with_completion_provider(mut self, provider: Arc<dyn TagHelperCompletionProvider>) -> Self {
        self.completion_engine = CompletionCandidateEngine::new(provider);
        self
    }

    /// Register a backing server for explicit content types.
    pub fn register_server(
        &self,
        name: impl Into<String>,
        content_types: Vec<String>,
        endpoint: Arc<dyn LanguageServerEndpoint>,
    ) {
        self.router.register(name, content_types, endpoint);
    }

    /// Register a backing server for the configured content types of `kind`.
    pub fn register_language_server(
        &self,
        name: impl Into<String>,
        kind: LanguageKind,
        endpoint: Arc<dyn LanguageServerEndpoint>,
    ) {
        let content_types = self.content_types_for(kind);
        self.router.register(name, content_types, endpoint);
    }

    pub fn store(&self) -> &Arc<VirtualDocumentStore> {
        &self.store
    }

    pub fn settings(&self) -> Arc<WorkspaceSettings> {
        self.settings_manager.load_settings()
    }

    pub(crate) fn content_types_for(&self, kind: LanguageKind) -> Vec<String> {
        self.settings_manager
            .load_settings()
            .content_types_for(kind)
            .to_vec()
    }

    /// Push live settings into every service that reads them.
    fn apply_settings(&self, settings: WorkspaceSettings) {
        self.synchronizer.set_timeout(settings.synchronization_timeout);
        self.router.set_request_timeout(settings.request_timeout);
        self.completion_cache
            .set_capacity(settings.completion_cache_capacity);
        self.settings_manager.apply_settings(settings);
    }

    fn apply_settings_outcome(&self, outcome: SettingsLoadOutcome) {
        for event in outcome.events {
            match event.kind {
                SettingsEventKind::Info => log::info!(target: LOG_TARGET, "{}", event.message),
                SettingsEventKind::Warning => log::warn!(target: LOG_TARGET, "{}", event.message),
            }
        }
        if let Some(settings) = outcome.settings {
            self.apply_settings(settings);
        }
    }

    pub fn initialize(&self, params: InitializeParams) -> InitializeResult {
        let root_path = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|folder| uri_to_url(&folder.uri).ok())
            .or_else(|| legacy_root_uri(&params).and_then(|uri| uri_to_url(uri).ok()))
            .and_then(|url| url.to_file_path().ok())
            .or_else(|| std::env::current_dir().ok());
        self.settings_manager.set_root_path(root_path);
        self.settings_manager.set_capabilities(params.capabilities);

        let override_settings = params
            .initialization_options
            .map(|options| (SettingsSource::InitializationOptions, options));
        let root_path = self.settings_manager.root_path();
        self.apply_settings_outcome(load_settings(
            (*root_path).as_deref(),
            override_settings,
        ));
        logging::init_logging(self.settings_manager.load_settings().log_level.as_deref());

        log::info!(
            target: LOG_TARGET,
            "Initialized with root {:?}",
            self.settings_manager.root_path()
        );

        InitializeResult {
            capabilities: Self::capabilities(),
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        }
    }

    /// Capabilities backed by the handlers in `text_document/`.
    pub fn capabilities() -> ServerCapabilities {
        ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(
                TextDocumentSyncKind::INCREMENTAL,
            )),
            completion_provider: Some(LspCompletionOptions {
                resolve_provider: Some(true),
                trigger_characters: Some(
                    ["@", "<", ".", " ", "/", ":"]
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                ),
                ..Default::default()
            }),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            definition_provider: Some(OneOf::Left(true)),
            references_provider: Some(OneOf::Left(true)),
            rename_provider: Some(OneOf::Left(true)),
            document_highlight_provider: Some(OneOf::Left(true)),
            document_on_type_formatting_provider: Some(DocumentOnTypeFormattingOptions {
                first_trigger_character: ";".to_string(),
                more_trigger_character: Some(vec!["}".to_string(), "\n".to_string()]),
            }),
            linked_editing_range_provider: Some(LinkedEditingRangeServerCapabilities::Simple(
                true,
            )),
            diagnostic_provider: Some(DiagnosticServerCapabilities::Options(DiagnosticOptions {
                identifier: Some(env!("CARGO_PKG_NAME").to_string()),
                inter_file_dependencies: true,
                workspace_diagnostics: false,
                ..Default::default()
            })),
            ..Default::default()
        }
    }

    pub fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let root_path = self.settings_manager.root_path();
        self.apply_settings_outcome(load_settings(
            (*root_path).as_deref(),
            Some((SettingsSource::ClientConfiguration, params.settings)),
        ));
    }

    pub fn did_open(&self, params: DidOpenTextDocumentParams) {
        let Ok(uri) = uri_to_url(&params.text_document.uri) else {
            log::warn!(target: LOG_TARGET, "Invalid URI in didOpen: {}", params.text_document.uri.as_str());
            return;
        };
        log::debug!(
            target: LOG_TARGET,
            "Opened {} at version {}",
            uri,
            params.text_document.version
        );
        // A reopen without didClose starts a new version history.
        self.synchronizer.forget(&uri);
        self.store
            .open(uri, params.text_document.version, params.text_document.text);
    }

    pub fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Ok(uri) = uri_to_url(&params.text_document.uri) else {
            log::warn!(target: LOG_TARGET, "Invalid URI in didChange: {}", params.text_document.uri.as_str());
            return;
        };
        if let Err(err) = self.store.apply_host_changes(
            &uri,
            params.text_document.version,
            &params.content_changes,
        ) {
            log::warn!(target: LOG_TARGET, "Rejected didChange for {}: {}", uri, err);
        }
    }

    /// Close a host document and the virtual documents opened for it.
    pub async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Ok(uri) = uri_to_url(&params.text_document.uri) else {
            log::warn!(target: LOG_TARGET, "Invalid URI in didClose: {}", params.text_document.uri.as_str());
            return;
        };
        self.synchronizer.forget(&uri);
        let Some(closed) = self.store.close(&uri) else {
            return;
        };
        for virtual_document in closed.virtual_documents() {
            // Never generated means never opened downstream.
            if virtual_document.version() == 0 {
                continue;
            }
            let params = json!({ "textDocument": { "uri": virtual_document.uri().as_str() } });
            self.router
                .notify(
                    &self.content_types_for(virtual_document.kind()),
                    "textDocument/didClose",
                    &params,
                )
                .await;
        }
    }

    /// Apply a regeneration from the Razor service and forward it downstream.
    ///
    /// The first generation opens the virtual document on its servers;
    /// later ones send the full text.
    pub async fn update_virtual_document(
        &self,
        update: VirtualDocumentUpdate,
    ) -> RouterResult<Option<VirtualDocumentSnapshot>> {
        let Some(snapshot) = self.store.update_virtual_document(&update)? else {
            return Ok(None);
        };
        let (method, params) = virtual_document_notification(&snapshot);
        self.router
            .notify(&self.content_types_for(snapshot.kind()), method, &params)
            .await;
        Ok(Some(snapshot))
    }

    /// Intake for notifications from backing servers; routes `$/progress`.
    ///
    /// Returns whether a waiting request consumed the notification.
    pub fn handle_server_notification(&self, method: &str, params: &Value) -> bool {
        self.progress.deliver_notification(method, params)
    }

    /// Fail outstanding progress listeners; called on shutdown.
    pub fn shutdown(&self) {
        self.progress.dispose();
    }
}

fn virtual_document_notification(snapshot: &VirtualDocumentSnapshot) -> (&'static str, Value) {
    if snapshot.version() == 1 {
        (
            "textDocument/didOpen",
            json!({
                "textDocument": {
                    "uri": snapshot.uri().as_str(),
                    "languageId": snapshot.kind().language_id(),
                    "version": snapshot.version(),
                    "text": snapshot.text(),
                }
            }),
        )
    } else {
        (
            "textDocument/didChange",
            json!({
                "textDocument": {
                    "uri": snapshot.uri().as_str(),
                    "version": snapshot.version(),
                },
                "contentChanges": [{ "text": snapshot.text() }],
            }),
        )
    }
}

// Clients predating workspace folders only send rootUri.
#[allow(deprecated)]
fn legacy_root_uri(params: &InitializeParams) -> Option<&Uri> {
    params.root_uri.as_ref()
}
