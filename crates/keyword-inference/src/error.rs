//! Inference error types.

use thiserror::Error;

use keyword_topology::TopologyError;

/// Error type for relationship inference.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl InferenceError {
    /// Only transport and server failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InferenceError::Api(_))
    }
}

impl From<InferenceError> for TopologyError {
    fn from(e: InferenceError) -> Self {
        TopologyError::Inference(e.to_string())
    }
}
