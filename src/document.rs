//! Host documents and their per-language virtual projections.

mod language;
pub mod position;
pub mod store;
pub mod synchronizer;
mod virtual_uri;

pub use language::LanguageKind;
pub use position::PositionMapper;
pub use store::{
    HostDocumentSnapshot, VirtualDocumentSnapshot, VirtualDocumentStore, VirtualDocumentUpdate,
    VirtualTextChange,
};
pub use synchronizer::{DEFAULT_SYNCHRONIZATION_TIMEOUT, DocumentSynchronizer};
pub use virtual_uri::VirtualDocumentUri;
