// src/error.rs

//! Unified error handling for the indexing service.

use std::fmt;

use thiserror::Error;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified application error type.
///
/// The first group of variants are the error kinds surfaced by the fetch and
/// crawl layers; the rest wrap infrastructure failures.
#[derive(Error, Debug)]
pub enum Error {
    /// The import path cannot be resolved, possibly with a canonical redirect.
    #[error("{message}")]
    NotFound {
        message: String,
        redirect: Option<String>,
    },

    /// Conditional fetch hit: the directory matches the saved etag.
    #[error("package not modified")]
    NotModified,

    /// The repository is a fork with no history of its own.
    #[error("repository is a dead-end fork")]
    QuickFork,

    /// Transport-level failure talking to a hosting service.
    #[error("remote error from {host}: {message}")]
    Remote { host: String, message: String },

    /// An inline crawl did not finish before its deadline.
    #[error("refresh timeout")]
    RefreshTimeout,

    /// Error from the key-value store.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            redirect: None,
        }
    }

    /// Create a not-found error carrying a canonical redirect path.
    pub fn redirect(message: impl Into<String>, redirect: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            redirect: Some(redirect.into()),
        }
    }

    /// Create a remote error tagged with the failing host.
    pub fn remote(host: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Remote {
            host: host.into(),
            message: message.to_string(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl fmt::Display) -> Self {
        Self::Store(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True if the error means the import path is unresolvable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True if the error is a conditional-fetch hit.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, Self::NotModified)
    }

    /// True if the error marks a dead-end fork.
    pub fn is_quick_fork(&self) -> bool {
        matches!(self, Self::QuickFork)
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}
