//! Error types for outbound HTTP and document parsing
//!
//! These are the leaf errors of the hub. They are wrapped by the unified
//! [`crate::error::Error`] at module boundaries.

use thiserror::Error;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status code
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Request timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Build a `FetchError` from a transport error, separating timeouts out
    pub fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(url.to_string())
        } else {
            Self::Http(err)
        }
    }

    /// HTTP status code carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Errors that can occur while parsing feeds, sitemaps and pages
#[derive(Error, Debug)]
pub enum ParseError {
    /// Document body was empty
    #[error("{kind} content is empty")]
    Empty { kind: &'static str },

    /// XML could not be parsed
    #[error("Invalid {kind} XML format")]
    InvalidXml { kind: &'static str },

    /// Well-formed XML that is neither of the supported shapes
    #[error("Unknown or unsupported {kind} format")]
    UnknownFormat { kind: &'static str },

    /// Invalid URL format
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors raised when an inbound push payload is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Payload was not a JSON object
    #[error("Payload must be a JSON object")]
    NotAnObject,

    /// A required field is absent or empty
    #[error("Essential data (source_url, node_id, original_post_id, title) is missing: {0}")]
    MissingField(&'static str),

    /// A URL field did not survive sanitization
    #[error("Invalid URL in '{field}': {value}")]
    InvalidUrl { field: &'static str, value: String },
}

/// Errors raised while probing or downloading a remote asset
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The HEAD probe could not reach the asset
    #[error("image URL returned status code: {0}")]
    NotAccessible(u16),

    /// The probe succeeded but the resource is not an image
    #[error("URL does not point to an image. Content-Type: {0}")]
    NotAnImage(String),

    /// Transport failure during probe or download
    #[error("download failed: {0}")]
    Fetch(#[from] FetchError),

    /// The download returned no bytes
    #[error("downloaded asset is empty: {0}")]
    EmptyBody(String),

    /// The asset could not be written to the asset store
    #[error("failed to store asset: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_accessor() {
        let err = FetchError::Status {
            url: "https://a.example/feed".into(),
            status: 503,
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(FetchError::Timeout("x".into()).status(), None);
    }

    #[test]
    fn test_parse_error_messages() {
        let err = ParseError::InvalidXml { kind: "RSS" };
        assert_eq!(err.to_string(), "Invalid RSS XML format");

        let err = ParseError::Empty { kind: "Sitemap" };
        assert_eq!(err.to_string(), "Sitemap content is empty");
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = ValidationError::MissingField("node_id");
        assert!(err.to_string().ends_with("node_id"));
    }

    #[test]
    fn test_download_error_wraps_fetch() {
        let err: DownloadError = FetchError::InvalidUrl("nope".into()).into();
        assert!(matches!(err, DownloadError::Fetch(_)));
    }
}
