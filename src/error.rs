//! Error types for book-relay
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`] - the crate-wide error returned by fallible public operations
//! - [`FetchError`] - a single failed fetch attempt (classified by [`FetchErrorKind`])
//! - [`PublishError`] - a single failed publish attempt, including rate-limit signals
//!
//! Stage errors are never propagated out of an item pipeline; they are absorbed by
//! the retrier and, once the attempt budget is spent, surface as a ledger entry.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for book-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for book-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "telegram.bot_token")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network error outside of a retried stage (e.g., building an HTTP client)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Destination enumeration returned nothing to publish to
    #[error("no destinations available: the bot is not a member of any group or channel")]
    NoDestinations,

    /// The item source yielded no records
    #[error("no items to process in {}", .source_path.display())]
    NoItems {
        /// The metadata or snapshot file that was read
        source_path: PathBuf,
    },

    /// Fetch stage error
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Publish stage error
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
}

/// Classification of a failed fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The locator is not a valid absolute URL
    InvalidUrl,
    /// The server answered with a non-success status code
    HttpStatus(u16),
    /// The request timed out
    Timeout,
    /// Connection or protocol failure
    Network,
    /// Writing the artifact to disk failed
    Io,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchErrorKind::InvalidUrl => write!(f, "invalid url"),
            FetchErrorKind::HttpStatus(code) => write!(f, "http status {code}"),
            FetchErrorKind::Timeout => write!(f, "timeout"),
            FetchErrorKind::Network => write!(f, "network error"),
            FetchErrorKind::Io => write!(f, "i/o error"),
        }
    }
}

/// A failed fetch attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    /// What went wrong
    pub kind: FetchErrorKind,
    /// Details from the underlying client
    pub message: String,
}

impl FetchError {
    /// Create a new fetch error
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::new(FetchErrorKind::Io, err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if let Some(status) = err.status() {
            FetchErrorKind::HttpStatus(status.as_u16())
        } else {
            FetchErrorKind::Network
        };
        FetchError::new(kind, err.to_string())
    }
}

/// A failed publish attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The channel asked us to back off for a fixed interval
    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited {
        /// Wait mandated by the channel before the next attempt
        retry_after: Duration,
    },

    /// Any other failure (network, API error, unreadable artifact)
    #[error("{0}")]
    Transient(String),
}

impl From<std::io::Error> for PublishError {
    fn from(err: std::io::Error) -> Self {
        PublishError::Transient(format!("failed to read artifact: {err}"))
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::Transient(err.to_string())
    }
}
