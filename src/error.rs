// Typed errors with thiserror. Surface meaningful messages to JS.

use thiserror::Error;

/// Engine error types.
#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No information retrieved from search.")]
    NoContent,

    #[error("Malformed generated content: {0}")]
    MalformedContent(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ReelError {
    fn from(err: serde_json::Error) -> Self {
        ReelError::Serialization(err.to_string())
    }
}
