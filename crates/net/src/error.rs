//! Network error types

use crate::session::SessionState;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid session state: {0:?}")]
    InvalidState(SessionState),

    #[error("No previous endpoint to reconnect to")]
    NoPreviousEndpoint,

    #[error("Handler error: {0}")]
    Handler(String),
}
