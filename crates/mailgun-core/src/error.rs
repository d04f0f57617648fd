//! Error types for the Mailgun provider
//!
//! This module defines all error types used throughout the crate.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for provider operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the Mailgun provider
#[derive(Error, Debug)]
pub enum Error {
    /// Remote call failed (the API answered with an error)
    #[error("Mailgun API error: {0}")]
    Api(String),

    /// A failure wrapped with the operation that was being performed
    #[error("{operation}: {source}")]
    Operation {
        /// What was being attempted, e.g. "creating domain example.com"
        operation: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// The entity was still visible when the delete confirmation ran out of time
    #[error("Timed out after {elapsed:?} waiting for {key} to disappear")]
    DeleteTimeout {
        /// Identity key of the entity
        key: String,
        /// How long the poller waited
        elapsed: Duration,
    },

    /// Import identifier could not be decoded
    #[error("Invalid import ID '{id}': {reason}")]
    MalformedImport {
        /// The raw identifier supplied by the user
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// A field failed validation before any remote call was attempted
    #[error("Invalid value for {field}: {message}")]
    Validation {
        /// Field name
        field: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// An entity that must exist was not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Create an API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create a malformed import error
    pub fn malformed_import(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedImport {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Wrap this error with the operation that produced it
    pub fn context(self, operation: impl Into<String>) -> Self {
        Self::Operation {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any operation wrappers
    pub fn root(&self) -> &Error {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error (or the one it wraps) is a delete-confirmation timeout
    pub fn is_delete_timeout(&self) -> bool {
        matches!(self.root(), Self::DeleteTimeout { .. })
    }
}

/// Extension for attaching operation context to results
pub trait ResultExt<T> {
    /// Wrap the error, if any, with the operation description
    fn context(self, operation: impl FnOnce() -> String) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, operation: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|e| e.context(operation()))
    }
}
