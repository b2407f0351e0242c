//! Topology error types.

use thiserror::Error;

/// Errors that can occur inside the keyword topology.
///
/// None of these reach the content pipeline through [`crate::KeywordPlanner`];
/// the planner logs them and falls back to a safe default.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Clustering error
    #[error("Clustering error: {0}")]
    Clustering(String),

    /// Relationship inference error
    #[error("Inference error: {0}")]
    Inference(String),

    /// Keyword extraction error
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
