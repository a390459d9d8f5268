//! Error types for the Stratgate service.

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for Stratgate operations.
///
/// Exceeding a rate limit is not an error; it is reported through
/// [`crate::ratelimit::RateLimitResult`].
#[derive(Error, Debug)]
pub enum GuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for GuardError {
    fn from(err: ::config::ConfigError) -> Self {
        GuardError::Config(err.to_string())
    }
}

/// Result type alias for Stratgate operations.
pub type Result<T> = std::result::Result<T, GuardError>;
