//! Error types for the AT command server.

use atserver_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by server operations.
#[derive(Debug, Error)]
pub enum AtError {
    /// The command or device reference is stale or was never issued.
    #[error("invalid handle")]
    InvalidHandle,

    /// No command is registered under this name.
    #[error("command not found: {0}")]
    NotFound(String),

    /// The command is bound to an invocation that has not completed.
    #[error("command is busy: {0}")]
    Busy(String),

    /// The I/O collaborator failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A command line could not be parsed.
    #[error("parse failure: {0}")]
    Parse(String),

    /// A handler is already attached to the command.
    #[error("command {0} already has a handler")]
    HandlerExists(String),

    /// A response was sent for a command that is not in flight.
    #[error("command {0} is not processing")]
    NotProcessing(String),

    /// Parameter index past the end of the current invocation's list.
    #[error("parameter index {index} out of range ({count} parameters)")]
    ParameterOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of captured parameters.
        count: usize,
    },

    /// The device is not registered for read readiness.
    #[error("device is not monitored")]
    NotMonitored,

    /// A configured capacity bound was reached.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// The server configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A protocol-level value was rejected.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for server operations.
pub type AtResult<T> = Result<T, AtError>;
