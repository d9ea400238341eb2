//! Error types for the dispatch core

use std::io;
use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, PollyError>;

/// Errors that can occur while dispatching intercepted requests
#[derive(Debug, Error)]
pub enum PollyError {
    /// A required hook was not provided by the transport integration
    #[error("[Polly] Must implement the `{hook}` hook.")]
    NotImplemented {
        /// Name of the missing hook
        hook: &'static str,
    },

    /// Replay mode, no stored entry and `record_if_missing` disabled
    #[error(
        "[Polly] [adapter:{adapter}] Recording for the following request is not found and \
         `recordIfMissing` is `false`.\n{method} {url}"
    )]
    MissingRecording {
        /// Adapter that handled the request
        adapter: String,
        /// Request method
        method: String,
        /// Request url
        url: String,
    },

    /// No dispatch rule matched the request
    #[error("[Polly] [adapter:{adapter}] Unhandled request: {method} {url}.")]
    UnhandledRequest {
        /// Adapter that handled the request
        adapter: String,
        /// Request method
        method: String,
        /// Request url
        url: String,
    },

    /// Intercepted response failed validation
    #[error("[Polly] Invalid intercepted response: {0}")]
    InvalidResponse(String),

    /// Persistence collaborator failure
    #[error("[Polly] Persister error: {0}")]
    Persister(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl PollyError {
    /// Whether the error aborts the enclosing test run
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotImplemented { .. }
                | Self::MissingRecording { .. }
                | Self::UnhandledRequest { .. }
        )
    }
}
