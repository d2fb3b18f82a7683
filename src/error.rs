//! Unified error handling for the chiral-hub crate
//!
//! Every fallible hub operation returns [`Error`]. The leaf errors from
//! fetching, parsing and asset downloads convert into it with `?`, and each
//! variant maps to a stable code that ends up in a node's error log or in the
//! [`ErrorResponse`] body sent back to a connector.
//!
//! ```rust,ignore
//! use chiral_hub::error::{Error, HubErrorTrait};
//!
//! fn log_failure(err: &Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(code = err.code(), "next scheduled run may succeed");
//!     } else {
//!         tracing::error!(code = err.code(), error = %err, "giving up");
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

// Leaf errors, re-exported so callers can match on them
pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::{DownloadError, FetchError, ParseError, ValidationError};

/// Codes and classification shared by the hub's error types
pub trait HubErrorTrait: std::error::Error {
    /// Check if this error is recoverable (the next scheduled run may succeed)
    fn is_recoverable(&self) -> bool;

    /// Machine-readable error code for API responses and the error log
    fn code(&self) -> &'static str;

    /// Broad bucket used to group error log entries
    fn category(&self) -> ErrorCategory;
}

/// Where an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, download)
    Network,
    /// Feed, sitemap and page parsing errors
    Parsing,
    /// Rejected inbound input
    Validation,
    /// Status policy and permission errors
    Policy,
    /// Storage and I/O errors
    Storage,
    /// Configuration errors
    Config,
    /// Task queue errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short lowercase name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Validation => "validation",
            Self::Policy => "policy",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the chiral-hub crate
#[derive(Error, Debug)]
pub enum Error {
    /// Push payload failed validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// More than one stored item claims the same identity tuple
    #[error("Identity conflict: {matches} items share source_url={source_url} node_id={node_id}")]
    IdentityConflict {
        source_url: String,
        node_id: String,
        matches: usize,
    },

    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Asset probe/download errors
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Parse-specific errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Caller tried to set a status the policy does not allow
    #[error("Unauthorized status '{attempted}', policy enforces '{enforced}'")]
    PolicyViolation { attempted: String, enforced: String },

    /// A bulk import is already in flight for the node
    #[error("An import is already in progress for node {node_id}")]
    JobAlreadyRunning { node_id: String },

    /// Sitemap resolved to zero importable URLs
    #[error("No URLs found in sitemap {sitemap_url}")]
    NoUrlsFound { sitemap_url: String },

    /// Actor lacks rights over the target item or node
    #[error("Permission denied for {actor_id}: {reason}")]
    PermissionDenied { actor_id: String, reason: String },

    /// Referenced entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Scheduler and task queue errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Storage backend failure that is not a database error
    #[error("Store error: {0}")]
    Store(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON in stored state or payloads
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Anything else, with a description and optional cause
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HubErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(_) | Self::Download(_) => true,
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Io(_) => true, // I/O errors are often transient
            Self::Store(_) => true,
            Self::Validation(_)
            | Self::IdentityConflict { .. }
            | Self::Parse(_)
            | Self::PolicyViolation { .. }
            | Self::JobAlreadyRunning { .. }
            | Self::NoUrlsFound { .. }
            | Self::PermissionDenied { .. }
            | Self::NotFound { .. }
            | Self::Database(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other { .. } => false,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Validation(ValidationError::MissingField(_)) => "missing_data",
            Self::Validation(ValidationError::InvalidUrl { .. }) => "invalid_url",
            Self::Validation(ValidationError::NotAnObject) => "invalid_payload",
            Self::IdentityConflict { .. } => "identity_conflict",
            Self::Fetch(FetchError::Timeout(_)) => "fetch_timeout",
            Self::Fetch(_) => "fetch_failed",
            Self::Download(DownloadError::NotAnImage(_)) => "not_an_image",
            Self::Download(DownloadError::NotAccessible(_)) => "image_not_accessible",
            Self::Download(_) => "download_failed",
            Self::Parse(ParseError::Empty { .. }) => "empty_document",
            Self::Parse(ParseError::InvalidXml { .. }) => "invalid_xml",
            Self::Parse(_) => "parse_failed",
            Self::PolicyViolation { .. } => "policy_violation",
            Self::JobAlreadyRunning { .. } => "import_in_progress",
            Self::NoUrlsFound { .. } => "no_urls_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::NotFound { .. } => "not_found",
            Self::Scheduler(_) => "scheduler_error",
            Self::Store(_) | Self::Database(_) | Self::Io(_) => "store_error",
            Self::Json(_) => "invalid_json",
            Self::Config(_) => "config_error",
            Self::Other { .. } => "internal_error",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Fetch(_) | Self::Download(_) => ErrorCategory::Network,
            Self::Parse(_) | Self::Json(_) => ErrorCategory::Parsing,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::PolicyViolation { .. } | Self::PermissionDenied { .. } => ErrorCategory::Policy,
            Self::IdentityConflict { .. }
            | Self::Store(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::NotFound { .. } => ErrorCategory::Storage,
            Self::JobAlreadyRunning { .. } | Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::NoUrlsFound { .. } => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a permission error
    pub fn permission_denied(actor_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            actor_id: actor_id.into(),
            reason: reason.into(),
        }
    }

    /// Free-form error with no cause
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary cause
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Structured body for push-path callers
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

// anyhow only appears at the config and CLI boundary
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Error body returned to push clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. `missing_data`
    pub code: String,

    /// Human-readable message
    pub message: String,
}

/// Result alias for hub operations
pub type Result<T> = std::result::Result<T, Error>;
