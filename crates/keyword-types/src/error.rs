//! Error types for the keyword planner.

use thiserror::Error;

/// Unified error type for shared keyword operations.
#[derive(Debug, Error)]
pub enum KeywordError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
