//! Error types for contract-lens

use std::io;

use thiserror::Error;

/// Result type alias for contract-lens
pub type Result<T> = std::result::Result<T, Error>;

/// contract-lens errors
///
/// Nothing reachable from untrusted page content or upstream payloads produces
/// one of these; they cover local setup (config, store, CLI input) only.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid address pattern in the registry
    #[error("Invalid pattern for {network}: {message}")]
    Pattern {
        /// Network tag the pattern belongs to
        network: String,
        /// What was wrong with it
        message: String,
    },

    /// Key-value store error
    #[error("Store error: {0}")]
    Store(String),

    /// Unknown node id passed to the content tree
    #[error("Unknown node: {0}")]
    UnknownNode(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a pattern error
    pub fn pattern(network: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::Pattern {
            network: network.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error came from user-supplied configuration
    #[must_use]
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Pattern { .. })
    }
}
