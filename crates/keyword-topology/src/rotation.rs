//! Core topic rotation.
//!
//! Keeps a few evergreen topics coming back on a fixed cadence. A core topic
//! is due when none of the last `interval - 1` uses was a core topic.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use keyword_types::{normalize_keyword, CoreTopic, RotationSettings};

use crate::history::UsageHistory;

#[derive(Debug, Clone)]
pub struct CoreRotation {
    interval: usize,
    topics: Vec<CoreTopic>,
    spellings: HashSet<String>,
}

impl CoreRotation {
    /// Build the rotation, or `None` when disabled or empty.
    pub fn from_settings(settings: &RotationSettings) -> Option<Self> {
        if !settings.enabled || settings.core_topics.is_empty() {
            return None;
        }
        Some(Self::new(settings.interval, settings.core_topics.clone()))
    }

    pub fn new(interval: usize, topics: Vec<CoreTopic>) -> Self {
        let spellings = topics
            .iter()
            .flat_map(|t| std::iter::once(&t.main).chain(t.variations.iter()))
            .map(|s| normalize_keyword(s))
            .collect();
        Self {
            interval: interval.max(2),
            topics,
            spellings,
        }
    }

    /// True when the keyword is a core topic or one of its variations.
    pub fn is_core(&self, keyword: &str) -> bool {
        self.spellings.contains(&normalize_keyword(keyword))
    }

    /// True when the next selection should be a core topic.
    pub fn is_due(&self, history: &UsageHistory) -> bool {
        if !history.has_any_history() {
            return true;
        }
        !history
            .recent_uses(self.interval - 1)
            .iter()
            .any(|(keyword, _)| self.is_core(keyword))
    }

    /// The core topic to use next: never-used topics first, then the one
    /// used longest ago. Ties keep configuration order.
    pub fn next_topic(&self, history: &UsageHistory) -> Option<&str> {
        self.topics
            .iter()
            .enumerate()
            .min_by_key(|(position, topic)| (self.last_used(topic, history), *position))
            .map(|(_, topic)| topic.main.as_str())
    }

    fn last_used(&self, topic: &CoreTopic, history: &UsageHistory) -> Option<DateTime<Utc>> {
        std::iter::once(&topic.main)
            .chain(topic.variations.iter())
            .filter_map(|s| history.last_used(s))
            .max()
    }
}
