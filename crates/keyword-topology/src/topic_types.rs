//! Coarse topic-type classification by substring patterns.

use std::collections::BTreeSet;

use keyword_types::{normalize_keyword, TopicTypeSettings};

/// Classifier built from configured topic types.
#[derive(Debug, Clone, Default)]
pub struct TopicTypes {
    types: Vec<TopicTypeSettings>,
}

impl TopicTypes {
    pub fn new(types: &[TopicTypeSettings]) -> Self {
        let types = types
            .iter()
            .map(|t| TopicTypeSettings {
                name: t.name.clone(),
                patterns: t
                    .patterns
                    .iter()
                    .map(|p| normalize_keyword(p))
                    .filter(|p| !p.is_empty())
                    .collect(),
            })
            .collect();
        Self { types }
    }

    /// Names of every type whose patterns occur in the keyword.
    pub fn classify(&self, keyword: &str) -> BTreeSet<&str> {
        let keyword = normalize_keyword(keyword);
        self.types
            .iter()
            .filter(|t| t.patterns.iter().any(|p| keyword.contains(p.as_str())))
            .map(|t| t.name.as_str())
            .collect()
    }

    /// True when the keyword matches the named type.
    pub fn matches(&self, keyword: &str, type_name: &str) -> bool {
        let keyword = normalize_keyword(keyword);
        self.types
            .iter()
            .filter(|t| t.name == type_name)
            .any(|t| t.patterns.iter().any(|p| keyword.contains(p.as_str())))
    }

    /// Union of the types of several keywords.
    pub fn classify_all<'k, I>(&self, keywords: I) -> BTreeSet<&str>
    where
        I: IntoIterator<Item = &'k str>,
    {
        keywords
            .into_iter()
            .flat_map(|k| self.classify(k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyword_types::Settings;

    fn defaults() -> TopicTypes {
        TopicTypes::new(&Settings::default().topic_types)
    }

    #[test]
    fn test_classify_default_types() {
        let types = defaults();
        assert_eq!(
            types.classify("Screen Readers Testing"),
            BTreeSet::from(["specific", "technical"])
        );
        assert_eq!(types.classify("WCAG 2.1"), BTreeSet::from(["compliance"]));
        assert!(types.classify("alt text").is_empty());
    }

    #[test]
    fn test_matches_named_type() {
        let types = defaults();
        assert!(types.matches("keyboard navigation", "specific"));
        assert!(!types.matches("keyboard navigation", "technical"));
        assert!(!types.matches("keyboard navigation", "unknown"));
    }

    #[test]
    fn test_classify_all_unions() {
        let types = defaults();
        let seen = types.classify_all(["accessibility roi", "healthcare websites"]);
        assert_eq!(seen, BTreeSet::from(["impact", "industry"]));
    }
}
