//! Keyword relationship types.

use serde::{Deserialize, Serialize};

/// Default strength for a relationship whose weight was not given.
pub const DEFAULT_RELATIONSHIP_WEIGHT: f64 = 0.5;

/// Kind of relationship between two keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    /// Source is the broader topic
    Parent,
    /// Source is the narrower topic
    Child,
    /// Same level of the topic hierarchy
    Sibling,
    /// Anything else
    #[default]
    Related,
}

impl RelationshipKind {
    /// Map a free-form label onto a kind. Unknown labels become `Related`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "parent" => RelationshipKind::Parent,
            "child" => RelationshipKind::Child,
            "sibling" => RelationshipKind::Sibling,
            _ => RelationshipKind::Related,
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationshipKind::Parent => write!(f, "parent"),
            RelationshipKind::Child => write!(f, "child"),
            RelationshipKind::Sibling => write!(f, "sibling"),
            RelationshipKind::Related => write!(f, "related"),
        }
    }
}

/// A persisted, undirected edge between two keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// First endpoint
    pub source: String,
    /// Second endpoint
    pub target: String,
    /// Relationship kind
    #[serde(rename = "type", default)]
    pub kind: RelationshipKind,
    /// Strength in (0, 1], 1.0 = strongest
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    DEFAULT_RELATIONSHIP_WEIGHT
}

impl Relationship {
    /// Create a new relationship.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: RelationshipKind,
        weight: f64,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            weight,
        }
    }
}

/// A relationship proposal from an inference oracle: one keyword and the
/// existing keywords it relates to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipProposal {
    /// The (usually new) keyword
    pub keyword: String,
    /// Related existing keywords
    #[serde(default)]
    pub related: Vec<String>,
    /// Kind applied to every pair in this proposal
    #[serde(default)]
    pub relationship_type: RelationshipKind,
    /// Strength applied to every pair in this proposal
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_label() {
        assert_eq!(RelationshipKind::from_label("Parent"), RelationshipKind::Parent);
        assert_eq!(RelationshipKind::from_label("child "), RelationshipKind::Child);
        assert_eq!(RelationshipKind::from_label("sibling"), RelationshipKind::Sibling);
        assert_eq!(RelationshipKind::from_label("cousin"), RelationshipKind::Related);
    }

    #[test]
    fn test_relationship_json_shape() {
        let rel = Relationship::new("wcag", "web accessibility", RelationshipKind::Child, 0.9);
        let json = serde_json::to_value(&rel).unwrap();
        assert_eq!(json["type"], "child");
        assert_eq!(json["source"], "wcag");

        let parsed: Relationship =
            serde_json::from_str(r#"{"source":"a","target":"b"}"#).unwrap();
        assert_eq!(parsed.kind, RelationshipKind::Related);
        assert!((parsed.weight - DEFAULT_RELATIONSHIP_WEIGHT).abs() < f64::EPSILON);
    }

    #[test]
    fn test_proposal_defaults() {
        let proposal: RelationshipProposal =
            serde_json::from_str(r#"{"keyword":"wcag 2.1"}"#).unwrap();
        assert!(proposal.related.is_empty());
        assert_eq!(proposal.relationship_type, RelationshipKind::Related);
    }
}
