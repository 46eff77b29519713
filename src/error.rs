//! Error types for the relay
//!
//! Registry and sink failures have their own enums; [`Error`] wraps them
//! together with transport and startup failures.

use crate::registry::RegistryError;
use crate::sink::SinkError;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or listener I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer connection failed mid-session
    #[error("transport error: {0}")]
    Transport(String),

    /// Outbound write did not complete within the send timeout
    #[error("send timed out after {0:?}")]
    SendTimeout(std::time::Duration),

    /// Registry rejected the operation
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Log sink failure
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<axum::Error> for Error {
    fn from(err: axum::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
