//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;

use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Collapse every whitespace run to one space and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Keep the first `max_words` words of `text`
///
/// Appends an ellipsis when words were dropped.
pub fn trim_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    format!("{}…", words[..max_words].join(" "))
}

/// Extract host from URL
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}

/// Path component of a URL, or an empty string when it cannot be parsed
pub fn url_path(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default()
}

/// Decode a response body using the charset from its headers or meta tag
///
/// Falls back to lossy UTF-8 when no known charset is declared.
pub fn decode_body(bytes: &[u8], content_type: &str) -> String {
    if let Some(encoding) = charset_from_content_type(content_type) {
        let (text, _, _) = encoding.decode(bytes);
        return text.into_owned();
    }

    // Look for <meta charset> or an XML declaration near the top
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]).to_lowercase();
    if let Some(label) = sniff_charset(&head) {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            let (text, _, _) = encoding.decode(bytes);
            return text.into_owned();
        }
    }

    let (text, _, _) = UTF_8.decode(bytes);
    text.into_owned()
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    let lower = content_type.to_lowercase();
    let idx = lower.find("charset=")?;
    let label = lower[idx + "charset=".len()..]
        .split(';')
        .next()?
        .trim()
        .trim_matches('"');
    Encoding::for_label(label.as_bytes())
}

fn sniff_charset(head: &str) -> Option<String> {
    static CHARSET_RE: OnceLock<Regex> = OnceLock::new();

    let re = CHARSET_RE.get_or_init(|| {
        Regex::new(r#"(?:charset|encoding)\s*=\s*["']?([a-z0-9_\-]+)"#).expect("Invalid regex pattern")
    });

    re.captures(head).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("hello\n\nworld"), "hello world");
    }

    #[test]
    fn test_trim_words() {
        assert_eq!(trim_words("one two three", 5), "one two three");
        assert_eq!(trim_words("one  two\nthree four", 2), "one two…");
        assert_eq!(trim_words("", 55), "");
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://blog.example.com/posts/1").as_deref(),
            Some("blog.example.com")
        );
        assert_eq!(extract_domain("not a url"), None);
    }

    #[test]
    fn test_url_path() {
        assert_eq!(url_path("https://a.example/blog/x?y=1"), "/blog/x");
        assert_eq!(url_path("https://a.example"), "/");
        assert_eq!(url_path("::"), "");
    }

    #[test]
    fn test_decode_body_with_header_charset() {
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode("café");
        assert_eq!(decode_body(&bytes, "text/html; charset=windows-1252"), "café");
    }

    #[test]
    fn test_decode_body_sniffs_xml_declaration() {
        let (bytes, _, _) =
            encoding_rs::WINDOWS_1252.encode("<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>né</a>");
        let text = decode_body(&bytes, "application/xml");
        assert!(text.contains("né"));
    }

    #[test]
    fn test_decode_body_defaults_to_utf8() {
        assert_eq!(decode_body("héllo".as_bytes(), ""), "héllo");
    }
}
