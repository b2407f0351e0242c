//! Keyword identity and metadata.
//!
//! Keywords are identified by their normalized form: trimmed, case-folded,
//! with internal whitespace collapsed to single spaces. "WCAG" and " wcag "
//! refer to the same keyword.
//!
//! ## Priority Scores
//!
//! ```text
//! critical = 3, high = 2, medium = 1, low = 0
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KeywordError;

/// Normalize raw keyword text into its identity form.
///
/// Returns an empty string for input that is blank after trimming.
pub fn normalize_keyword(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Editorial priority of a keyword.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Must be covered first
    Critical,
    /// High search value
    High,
    /// Default for extracted keywords
    #[default]
    Medium,
    /// Nice to have
    Low,
}

impl Priority {
    /// Numeric score used for cluster averages and selection scoring.
    pub fn score(&self) -> u32 {
        match self {
            Priority::Critical => 3,
            Priority::High => 2,
            Priority::Medium => 1,
            Priority::Low => 0,
        }
    }

    /// All priorities, highest first.
    pub fn all() -> &'static [Priority] {
        &[
            Priority::Critical,
            Priority::High,
            Priority::Medium,
            Priority::Low,
        ]
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = KeywordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(KeywordError::InvalidInput(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

/// Metadata stored for every known keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRecord {
    /// Editorial priority (may change on re-extraction)
    #[serde(default)]
    pub priority: Priority,
    /// Provenance tag, usually the context file the keyword came from
    #[serde(default)]
    pub source: String,
    /// Occurrences across source documents (may change on re-extraction)
    #[serde(default)]
    pub frequency: u32,
    /// When the keyword was first seen
    #[serde(alias = "addedDate", with = "crate::time::lenient")]
    pub added_date: DateTime<Utc>,
}

impl KeywordRecord {
    /// Create a record for a keyword first seen at `added_date`.
    pub fn new(
        priority: Priority,
        source: impl Into<String>,
        frequency: u32,
        added_date: DateTime<Utc>,
    ) -> Self {
        Self {
            priority,
            source: source.into(),
            frequency,
            added_date,
        }
    }
}

/// A keyword as produced by an extraction pass over source documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedKeyword {
    /// Normalized keyword text
    pub keyword: String,
    /// Priority assigned by the extractor
    pub priority: Priority,
    /// Source document
    pub source: String,
    /// Occurrence count across all scanned documents
    pub frequency: u32,
}

impl ExtractedKeyword {
    /// Create an extracted keyword, normalizing its text.
    pub fn new(keyword: &str, priority: Priority, source: impl Into<String>, frequency: u32) -> Self {
        Self {
            keyword: normalize_keyword(keyword),
            priority,
            source: source.into(),
            frequency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_and_whitespace() {
        assert_eq!(normalize_keyword("  WCAG  "), "wcag");
        assert_eq!(normalize_keyword("Web\tAccessibility"), "web accessibility");
        assert_eq!(normalize_keyword("Screen   Readers "), "screen readers");
        assert_eq!(normalize_keyword("   "), "");
    }

    #[test]
    fn test_priority_scores() {
        assert_eq!(Priority::Critical.score(), 3);
        assert_eq!(Priority::High.score(), 2);
        assert_eq!(Priority::Medium.score(), 1);
        assert_eq!(Priority::Low.score(), 0);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_priority_parse_and_display() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::Critical.to_string(), "critical");
    }

    #[test]
    fn test_priority_ordering_highest_first() {
        let mut priorities = vec![Priority::Low, Priority::Critical, Priority::Medium];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![Priority::Critical, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn test_record_reads_legacy_and_camel_case() {
        let legacy = r#"{"priority":"high","source":"SEO Content.md","frequency":3,"added_date":"2024-05-01T12:00:00.123456"}"#;
        let record: KeywordRecord = serde_json::from_str(legacy).unwrap();
        assert_eq!(record.priority, Priority::High);
        assert_eq!(record.frequency, 3);

        let camel = r#"{"priority":"low","source":"x","frequency":1,"addedDate":"2024-05-01T12:00:00Z"}"#;
        let record: KeywordRecord = serde_json::from_str(camel).unwrap();
        assert_eq!(record.priority, Priority::Low);
    }

    #[test]
    fn test_extracted_keyword_normalizes() {
        let kw = ExtractedKeyword::new(" Color Contrast ", Priority::High, "a.md", 2);
        assert_eq!(kw.keyword, "color contrast");
    }
}
