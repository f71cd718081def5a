//! Error types for the AT protocol.

use thiserror::Error;

/// Errors that can occur when validating protocol-level values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A command name was empty.
    #[error("command name is empty")]
    EmptyName,

    /// A command name exceeds the configured bound.
    #[error("command name too long: max {max} bytes, got {actual}")]
    NameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length supplied.
        actual: usize,
    },

    /// A command name contains bytes the parser can never produce.
    #[error("invalid command name: {0}")]
    InvalidName(String),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
