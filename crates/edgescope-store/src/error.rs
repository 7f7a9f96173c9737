//! Error types for proxy store access.

use thiserror::Error;

/// Result type alias for proxy store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the proxy store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("io error: {0}")]
    Io(String),

    /// A reply did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error reply.
    #[error("server error: {0}")]
    Server(String),
}
