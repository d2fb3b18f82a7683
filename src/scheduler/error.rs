//! Error types for the task scheduler

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// No handler registered for a task's handler key
    UnknownHandler { handler: String },

    /// Task arguments could not be decoded for its handler
    InvalidArgs { handler: String, reason: String },

    /// Queue file could not be read or written
    QueueIo { operation: String, reason: String },

    /// Serialization/deserialization error
    SerializationError { reason: String },

    /// Queue lock was poisoned by a panicking writer
    LockPoisoned,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownHandler { handler } => {
                write!(f, "No handler registered for task '{}'", handler)
            }
            Self::InvalidArgs { handler, reason } => {
                write!(f, "Invalid arguments for task '{}': {}", handler, reason)
            }
            Self::QueueIo { operation, reason } => {
                write!(f, "Task queue IO error during '{}': {}", operation, reason)
            }
            Self::SerializationError { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
            Self::LockPoisoned => write!(f, "Task queue lock poisoned"),
        }
    }
}

impl std::error::Error for SchedulerError {}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        Self::QueueIo {
            operation: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl SchedulerError {
    /// Create an unknown handler error
    pub fn unknown_handler(handler: impl Into<String>) -> Self {
        Self::UnknownHandler {
            handler: handler.into(),
        }
    }

    /// Create an invalid arguments error
    pub fn invalid_args(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgs {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Create a queue IO error with context
    pub fn queue_io(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueueIo {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::QueueIo { .. })
    }
}
