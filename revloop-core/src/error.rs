//! Error types for revloop

use std::time::Duration;

use humantime_serde::re::humantime::format_duration;
use thiserror::Error;

/// Result type alias for revloop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for revloop operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pull request does not exist on the host
    #[error("Pull request #{0} not found")]
    PrNotFound(u64),

    /// Diff or metadata could not be fetched from the host
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// LLM request failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector store query failed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// An external call exceeded its time budget
    #[error("Timed out after {}: {operation}", format_duration(*.limit))]
    Timeout { operation: String, limit: Duration },

    /// Persisted selector state does not match the running feature schema or prompt catalog
    #[error("Selector state mismatch: {0}")]
    StateMismatch(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error should stop the batch before any PR is processed
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::StateMismatch(_))
    }
}
