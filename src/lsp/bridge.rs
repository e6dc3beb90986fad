//! Dispatch to backing language servers.
//!
//! Backing servers (HTML, C#) are opaque endpoints registered under a name
//! and the content types they serve. The router sends typed requests to one
//! named server or fans out over every server for a content type.

mod endpoint;
mod error_types;
mod first_win;
mod router;

pub use endpoint::LanguageServerEndpoint;
pub use error_types::{ErrorCodes, ResponseError};
pub use router::{ReinvocationResponse, RequestRouter, ServerRegistration};
