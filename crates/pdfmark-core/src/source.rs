//! Where documents come from: URL checks for the fetch path and the
//! navigation hand-off (`viewer.html?file=<url>`)

use crate::error::ViewerError;

/// Query parameter carrying the document URL
pub const FILE_PARAM: &str = "file";

/// URL schemes that belong to the browser itself and are never intercepted
const EXTENSION_SCHEMES: &[&str] = &["chrome-extension", "moz-extension", "extension"];

/// Scheme of an absolute URL, lowercased
fn scheme(url: &str) -> Option<String> {
    let (scheme, _) = url.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic()
        || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

/// Check that `url` is absolute and uses one of `allowed_schemes`
pub fn validate_source_url(url: &str, allowed_schemes: &[String]) -> Result<(), ViewerError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ViewerError::Fetch("no URL given".to_string()));
    }

    let scheme = scheme(url)
        .ok_or_else(|| ViewerError::Fetch(format!("not an absolute URL: {}", url)))?;
    if allowed_schemes
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&scheme))
    {
        Ok(())
    } else {
        Err(ViewerError::Fetch(format!(
            "scheme '{}' is not allowed (expected one of: {})",
            scheme,
            allowed_schemes.join(", ")
        )))
    }
}

/// Decode a form-encoded query component. Malformed escapes are kept as-is.
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

/// Extract the document URL from a query string such as `?file=https%3A...`
pub fn source_url_from_query(query: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| decode_component(key) == FILE_PARAM)
        .map(|(_, value)| decode_component(value))
        .filter(|url| !url.trim().is_empty())
}

/// Whether a top-level navigation to `url` should open in the viewer: the
/// path ends in `.pdf` (any case, ignoring query and fragment) and the URL is
/// not one of the browser's own extension pages.
pub fn is_pdf_navigation(url: &str) -> bool {
    let Some(scheme) = scheme(url) else {
        return false;
    };
    if EXTENSION_SCHEMES.contains(&scheme.as_str()) {
        return false;
    }

    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_ascii_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn defaults() -> Vec<String> {
        vec!["http".to_string(), "https".to_string(), "file".to_string()]
    }

    #[test]
    fn test_allowed_schemes_pass() {
        for url in [
            "https://example.com/a.pdf",
            "HTTP://example.com/a.pdf",
            "file:///home/user/doc.pdf",
        ] {
            assert!(validate_source_url(url, &defaults()).is_ok(), "{}", url);
        }
    }

    #[test]
    fn test_other_schemes_are_fetch_errors() {
        for url in ["ftp://example.com/a.pdf", "javascript:alert(1)", "a.pdf", ""] {
            assert!(
                matches!(validate_source_url(url, &defaults()), Err(ViewerError::Fetch(_))),
                "{}",
                url
            );
        }
    }

    #[test]
    fn test_query_extraction_decodes() {
        assert_eq!(
            source_url_from_query("?file=https%3A%2F%2Fexample.com%2Fmy%20doc.pdf"),
            Some("https://example.com/my doc.pdf".to_string())
        );
        assert_eq!(
            source_url_from_query("zoom=2&file=file:///tmp/a+b.pdf"),
            Some("file:///tmp/a b.pdf".to_string())
        );
    }

    #[test]
    fn test_query_without_file_param() {
        assert_eq!(source_url_from_query(""), None);
        assert_eq!(source_url_from_query("?zoom=2"), None);
        assert_eq!(source_url_from_query("?file="), None);
    }

    #[test]
    fn test_malformed_escape_is_kept() {
        assert_eq!(decode_component("100%"), "100%");
        assert_eq!(decode_component("%zz"), "%zz");
        assert_eq!(decode_component("%41"), "A");
        assert_eq!(decode_component("a%2Bb+c"), "a+b c");
        assert_eq!(decode_component("caf%C3%A9"), "café");
    }

    #[test]
    fn test_pdf_navigation_detection() {
        assert!(is_pdf_navigation("https://example.com/paper.pdf"));
        assert!(is_pdf_navigation("https://example.com/PAPER.PDF?dl=1#page=2"));
        assert!(is_pdf_navigation("file:///C:/docs/a.pdf"));

        assert!(!is_pdf_navigation("https://example.com/paper.pdf.html"));
        assert!(!is_pdf_navigation("https://example.com/view?file=a.pdf"));
        assert!(!is_pdf_navigation("chrome-extension://abc/viewer.pdf"));
        assert!(!is_pdf_navigation("not a url.pdf"));
    }
}
