//! Runner error type.

use atserver::AtError;
use thiserror::Error;

/// Errors raised while configuring or running the TCP front end.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Server error: {0}")]
    Server(#[from] AtError),
}

/// Result type for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
