//! Relationship inference seam.
//!
//! An oracle proposes relationships between newly extracted keywords and
//! the keywords already in the topology. Proposals are advisory; the graph
//! drops any that reference unknown keywords.

use async_trait::async_trait;

use keyword_types::RelationshipProposal;

use crate::error::TopologyError;

/// Proposes keyword relationships.
#[async_trait]
pub trait RelationshipOracle: Send + Sync {
    /// Oracle name for logs.
    fn name(&self) -> &str;

    /// Propose relationships for `new` keywords given `existing` ones.
    async fn propose(
        &self,
        new: &[String],
        existing: &[String],
    ) -> Result<Vec<RelationshipProposal>, TopologyError>;
}

/// Proposes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpOracle;

#[async_trait]
impl RelationshipOracle for NoOpOracle {
    fn name(&self) -> &str {
        "noop"
    }

    async fn propose(
        &self,
        _new: &[String],
        _existing: &[String],
    ) -> Result<Vec<RelationshipProposal>, TopologyError> {
        Ok(Vec::new())
    }
}

/// Returns a fixed proposal list.
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    proposals: Vec<RelationshipProposal>,
}

impl StaticOracle {
    pub fn new(proposals: Vec<RelationshipProposal>) -> Self {
        Self { proposals }
    }
}

#[async_trait]
impl RelationshipOracle for StaticOracle {
    fn name(&self) -> &str {
        "static"
    }

    async fn propose(
        &self,
        _new: &[String],
        _existing: &[String],
    ) -> Result<Vec<RelationshipProposal>, TopologyError> {
        Ok(self.proposals.clone())
    }
}
