//! Virtual document URI for embedded languages.
//!
//! Each Razor host document projects onto one virtual document per embedded
//! language. The virtual document lives next to its host so that downstream
//! servers resolve project files and relative paths the same way they would
//! for the host.
//!
//! For "cannot-be-a-base" URIs (untitled:, mailto:, data:), a `razor-virtual:`
//! scheme fallback is used.

use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

use super::LanguageKind;

/// Scheme used when the host URI has no modifiable path.
const FALLBACK_SCHEME: &str = "razor-virtual";

/// Virtual document URI for one embedded language of a host document.
///
/// ## URI Format
///
/// For normal URIs (file://, https://, etc.):
/// - Format: `{host_uri}{suffix}` where suffix is `__virtual.html` or `__virtual.cs`
/// - Example: `file:///project/Pages/Index.razor__virtual.cs`
///
/// For cannot-be-a-base URIs:
/// - Format: `razor-virtual:///{encoded_host}{suffix}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VirtualDocumentUri {
    host_uri: Url,
    kind: LanguageKind,
    uri: Url,
}

impl VirtualDocumentUri {
    /// Build the virtual URI for `kind` under `host_uri`.
    ///
    /// Returns None for `LanguageKind::Razor`, which has no virtual document.
    pub fn new(host_uri: &Url, kind: LanguageKind) -> Option<Self> {
        let suffix = kind.virtual_suffix()?;
        let uri = Self::derive(host_uri, suffix)?;
        Some(Self {
            host_uri: host_uri.clone(),
            kind,
            uri,
        })
    }

    fn derive(host_uri: &Url, suffix: &str) -> Option<Url> {
        let mut url = host_uri.clone();
        let file_name = host_uri
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned());

        if let Some(file_name) = file_name {
            // path_segments_mut() returns Err for cannot-be-a-base URIs
            let modified = url
                .path_segments_mut()
                .map(|mut segments| {
                    segments.pop();
                    segments.push(&format!("{file_name}{suffix}"));
                })
                .is_ok();
            if modified {
                return Some(url);
            }
        }

        let encoded_host = utf8_percent_encode(host_uri.as_str(), NON_ALPHANUMERIC);
        Url::parse(&format!("{FALLBACK_SCHEME}:///{encoded_host}{suffix}")).ok()
    }

    /// The host document this virtual document is projected from.
    pub fn host_uri(&self) -> &Url {
        &self.host_uri
    }

    /// The embedded language of this virtual document.
    pub fn kind(&self) -> LanguageKind {
        self.kind
    }

    /// The virtual document URI itself.
    pub fn as_url(&self) -> &Url {
        &self.uri
    }

    /// Check if a URI string names a virtual document.
    ///
    /// Only the last path segment is inspected, so query strings or
    /// fragments containing the suffix do not produce false positives.
    pub fn is_virtual_uri(uri: &str) -> bool {
        let Ok(url) = Url::parse(uri) else {
            return false;
        };
        if url.scheme() == FALLBACK_SCHEME {
            return true;
        }
        let Some(filename) = url.path_segments().and_then(|mut s| s.next_back()) else {
            return false;
        };
        LanguageKind::EMBEDDED
            .iter()
            .filter_map(|kind| kind.virtual_suffix())
            .any(|suffix| filename.ends_with(suffix) && filename.len() > suffix.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(uri: &str) -> Url {
        Url::parse(uri).unwrap()
    }

    #[test]
    fn csharp_virtual_uri_sits_next_to_host() {
        let virtual_uri =
            VirtualDocumentUri::new(&host("file:///project/Pages/Index.razor"), LanguageKind::CSharp)
                .unwrap();

        assert_eq!(
            virtual_uri.as_url().as_str(),
            "file:///project/Pages/Index.razor__virtual.cs"
        );
        assert_eq!(virtual_uri.kind(), LanguageKind::CSharp);
        assert_eq!(virtual_uri.host_uri().as_str(), "file:///project/Pages/Index.razor");
    }

    #[test]
    fn html_virtual_uri_uses_html_suffix() {
        let virtual_uri =
            VirtualDocumentUri::new(&host("file:///Index.cshtml"), LanguageKind::Html).unwrap();
        assert_eq!(virtual_uri.as_url().as_str(), "file:///Index.cshtml__virtual.html");
    }

    #[test]
    fn razor_kind_has_no_virtual_uri() {
        assert!(VirtualDocumentUri::new(&host("file:///Index.razor"), LanguageKind::Razor).is_none());
    }

    #[test]
    fn percent_encoding_in_file_name_is_not_doubled() {
        let virtual_uri =
            VirtualDocumentUri::new(&host("file:///my%20app/My%20Page.razor"), LanguageKind::Html)
                .unwrap();
        assert_eq!(
            virtual_uri.as_url().as_str(),
            "file:///my%20app/My%20Page.razor__virtual.html"
        );
    }

    #[test]
    fn cannot_be_a_base_host_uses_fallback_scheme() {
        let virtual_uri =
            VirtualDocumentUri::new(&host("untitled:Untitled-1"), LanguageKind::CSharp).unwrap();

        let uri = virtual_uri.as_url().as_str();
        assert!(uri.starts_with("razor-virtual:///untitled%3AUntitled%2D1"), "got {uri}");
        assert!(uri.ends_with("__virtual.cs"), "got {uri}");
        assert!(VirtualDocumentUri::is_virtual_uri(uri));
    }

    #[test]
    fn is_virtual_uri_checks_the_file_name_only() {
        assert!(VirtualDocumentUri::is_virtual_uri(
            "file:///p/Index.razor__virtual.cs"
        ));
        assert!(!VirtualDocumentUri::is_virtual_uri("file:///p/Index.razor"));
        assert!(!VirtualDocumentUri::is_virtual_uri(
            "file:///p/Index.razor?x=__virtual.cs"
        ));
        assert!(!VirtualDocumentUri::is_virtual_uri("not a uri"));
    }
}
