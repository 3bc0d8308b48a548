//! Error types for data parsing in sr08-types.

use thiserror::Error;

/// Errors that can occur when interpreting SR08 notification payloads.
///
/// This error type is platform-agnostic and does not include transport or
/// network errors (those belong in sr08-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A field was present but its value could not be interpreted.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}
