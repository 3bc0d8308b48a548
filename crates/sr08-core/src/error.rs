//! Error types for sr08-core.
//!
//! # Recovery strategy
//!
//! | Error | Strategy |
//! |-------|----------|
//! | [`Error::NotConnected`] | Run the connection supervisor, then retry |
//! | [`Error::Transport`] | Retry with backoff |
//! | [`Error::Cancelled`] | Do not retry; the owning task was torn down |
//!
//! Workflow-level failures (step timeouts, pre-flight connection checks)
//! use [`crate::sequencer::WorkflowError`]; delivery outcomes use
//! [`crate::delivery::DeliveryResult`]. Neither is fatal to the process:
//! the orchestrator persists every finalized record locally before any
//! delivery attempt, so a failed cycle loses at most one partial window.

use thiserror::Error;

/// Errors reported by [`crate::transport::Transport`] implementations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Operation attempted while the link is down.
    #[error("not connected to ring")]
    NotConnected,

    /// The transport rejected or failed a request.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation was cancelled by tearing down its owning task.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Result type alias using sr08-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "not connected to ring");

        let err = Error::transport("gatt write rejected");
        assert!(err.to_string().contains("gatt write rejected"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "socket gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
