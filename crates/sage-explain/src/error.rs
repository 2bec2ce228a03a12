//! Error Types

use thiserror::Error;

/// Result type alias for explanation streaming
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Explanation stream errors
#[derive(Error, Debug)]
pub enum ExplainError {
    /// Request could not be sent or the body read failed midway
    #[error("Transport error: {0}")]
    Transport(String),

    /// Endpoint answered with a non-success status
    #[error("Network response was not ok: {0}")]
    Status(u16),

    /// A `data:` line did not hold valid JSON. Logged and skipped, never fatal.
    #[error("Stream decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ExplainError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
