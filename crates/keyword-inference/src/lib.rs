//! # keyword-inference
//!
//! LLM-backed relationship inference for the keyword planner.
//!
//! [`LlmRelationshipOracle`] implements `keyword_topology::RelationshipOracle`
//! against OpenAI-compatible or Anthropic chat endpoints. Calls are wrapped
//! in [`retry`] with an exponential [`RetryPolicy`].
//!
//! ```rust,ignore
//! use keyword_inference::{LlmOracleConfig, LlmRelationshipOracle};
//!
//! let config = LlmOracleConfig::openai(api_key, "gpt-4o-mini");
//! let oracle = LlmRelationshipOracle::new(config)?;
//! let proposals = oracle.propose(&new_keywords, &existing).await?;
//! ```

pub mod error;
pub mod oracle;
pub mod retry;

pub use error::InferenceError;
pub use oracle::{
    extract_json, parse_proposals, LlmOracleConfig, LlmRelationshipOracle, Provider,
    MIN_PROPOSAL_WEIGHT,
};
pub use retry::{retry, RetryPolicy};
