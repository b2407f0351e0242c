//! # keyword-types
//!
//! Shared domain types for the keyword planner.
//!
//! This crate defines the core data structures used throughout the system:
//! - Keywords: normalized identity, priority, and per-keyword metadata
//! - Relationships: undirected, weighted edges between keywords
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use keyword_types::{normalize_keyword, Priority};
//!
//! assert_eq!(normalize_keyword(" WCAG "), "wcag");
//! assert_eq!(Priority::High.score(), 2);
//! ```

pub mod config;
pub mod error;
pub mod keyword;
pub mod relationship;
pub mod time;

pub use config::{
    ClusteringSettings, ClusteringStrategyKind, CoreTopic, InferenceSettings, RotationSettings,
    Settings, TopicTypeSettings, SPECIFIC_TOPIC_TYPE, TECHNICAL_TOPIC_TYPE,
};
pub use error::KeywordError;
pub use keyword::{normalize_keyword, ExtractedKeyword, KeywordRecord, Priority};
pub use relationship::{
    Relationship, RelationshipKind, RelationshipProposal, DEFAULT_RELATIONSHIP_WEIGHT,
};
pub use time::parse_timestamp;
