//! # keyword-topology
//!
//! Keyword coverage planning for the content pipeline.
//!
//! Keywords extracted from context documents form an undirected relationship
//! graph. The graph is partitioned into clusters, usage is tracked per
//! keyword, and the next keyword is picked from the least-covered cluster
//! while respecting a cooldown window and topic-type diversity.
//!
//! ## Features
//! - Usage history with cooldown queries
//! - Relationship graph with first-writer-wins edges
//! - Louvain community detection with connected-components fallback
//! - Coverage reports per cluster and per priority tier
//! - Multi-factor keyword selection with a total fallback chain
//! - Optional core topic rotation
//! - Atomic JSON persistence
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keyword_topology::{KeywordPlanner, PlannerDeps};
//! use keyword_types::Settings;
//!
//! let settings = Settings::load(None)?;
//! let planner = KeywordPlanner::open(&settings, PlannerDeps::from_settings(&settings)?);
//! planner.update_topology().await;
//! let keyword = planner.next_keyword().await;
//! planner.record_keyword_use(&keyword).await;
//! ```

pub mod clustering;
pub mod clusters;
pub mod coverage;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod history;
pub mod oracle;
pub mod planner;
pub mod rotation;
pub mod selector;
pub mod storage;
pub mod topic_types;
pub mod types;

pub use clustering::{
    modularity, strategy_from_settings, ClusteringStrategy, ConnectedComponents,
    FallbackClustering, LouvainClustering,
};
pub use clusters::{Cluster, ClusterId, ClusterIndex};
pub use coverage::{ClusterCoverage, CoverageReport, CoverageTracker, PriorityCoverage};
pub use error::TopologyError;
pub use extraction::{ContextDirExtractor, KeywordExtractor, StaticExtractor};
pub use graph::{EdgeOutcome, Neighbor, RelationshipGraph};
pub use history::UsageHistory;
pub use oracle::{NoOpOracle, RelationshipOracle, StaticOracle};
pub use planner::{KeywordPlanner, PlannerDeps, PlannerStatus, UpdateSummary};
pub use rotation::CoreRotation;
pub use selector::{KeywordSelector, Selection, SelectionContext, SelectionReason};
pub use storage::{TopologyDocument, TopologyStore};
pub use topic_types::TopicTypes;
pub use types::{KeywordTable, UpsertOutcome};
