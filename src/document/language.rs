//! Language kinds that can appear inside a Razor host document.

use serde::{Deserialize, Serialize};

/// The language a host-document position belongs to.
///
/// `Razor` positions belong to the host language itself and have no virtual
/// document; `Html` and `CSharp` each project onto one virtual document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LanguageKind {
    Razor,
    Html,
    #[serde(rename = "csharp")]
    CSharp,
}

impl LanguageKind {
    /// Languages that are backed by a virtual document.
    pub const EMBEDDED: [LanguageKind; 2] = [LanguageKind::Html, LanguageKind::CSharp];

    /// Whether positions of this kind project onto a virtual document.
    pub fn is_embedded(self) -> bool {
        !matches!(self, LanguageKind::Razor)
    }

    /// Suffix appended to the host file name to form the virtual document name.
    pub(crate) fn virtual_suffix(self) -> Option<&'static str> {
        match self {
            LanguageKind::Razor => None,
            LanguageKind::Html => Some("__virtual.html"),
            LanguageKind::CSharp => Some("__virtual.cs"),
        }
    }

    /// LSP language identifier used when opening the virtual document downstream.
    pub(crate) fn language_id(self) -> &'static str {
        match self {
            LanguageKind::Razor => "razor",
            LanguageKind::Html => "html",
            LanguageKind::CSharp => "csharp",
        }
    }
}

impl std::fmt::Display for LanguageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.language_id())
    }
}
