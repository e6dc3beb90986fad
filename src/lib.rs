pub mod completion;
pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod lsp;

pub use config::WorkspaceSettings;
pub use document::{
    HostDocumentSnapshot, LanguageKind, VirtualDocumentSnapshot, VirtualDocumentStore,
    VirtualDocumentUpdate, VirtualTextChange,
};
pub use error::{RouterError, RouterResult};
pub use lsp::RazorRouter;
pub use lsp::bridge::LanguageServerEndpoint;
pub use lsp::mapping::{DocumentMappingService, MappedRanges, RemappedEdits};
pub use lsp::projection::{LanguageClassification, LanguageClassifier};
