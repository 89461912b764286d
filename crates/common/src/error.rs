use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport unreachable. Retried lazily by the next operation.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed signal or observation, dropped at the boundary that saw it.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Trading backend call failed. Never retried automatically.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
