//! Error types for the switchyard host.

use switchyard_router::RouterError;

/// Top-level error type for the host process.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Routing engine error.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Configuration file error.
    #[error("config error: {0}")]
    Config(String),

    /// Credential store error.
    #[error("credential error: {0}")]
    Credential(String),

    /// Bridge protocol error (malformed request, serialization).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HostError>;
