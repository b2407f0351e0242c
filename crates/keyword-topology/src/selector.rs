//! Next-keyword selection.
//!
//! Selection runs over borrowed state and never fails. The steps are:
//!
//! 1. Core rotation, when enabled and due
//! 2. Cooldown filter (hard constraint)
//! 3. Topic-type diversity filter (soft, skipped if it would empty the set)
//! 4. Least-covered cluster with a surviving candidate, best score wins
//! 5. First surviving candidate in insertion order
//!
//! When cooldown removes every keyword, the least recently used keyword is
//! returned instead. With an empty topology the default topic is returned.
//!
//! ## Scoring
//!
//! ```text
//! score = type_bonus + priority_score + min(degree, 3)
//! type_bonus = 3 if "specific", else 2 if "technical", else 0
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use keyword_types::{Settings, SPECIFIC_TOPIC_TYPE, TECHNICAL_TOPIC_TYPE};

use crate::clusters::{ClusterId, ClusterIndex};
use crate::coverage::CoverageTracker;
use crate::graph::RelationshipGraph;
use crate::history::{days, UsageHistory};
use crate::rotation::CoreRotation;
use crate::topic_types::TopicTypes;
use crate::types::KeywordTable;

/// Degree contribution to the score is capped here.
const MAX_DEGREE_BONUS: usize = 3;

/// Why a keyword was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionReason {
    /// Best-scoring candidate in the least-covered cluster
    ClusterTarget { cluster_id: ClusterId, score: u32 },
    /// No cluster had a candidate
    FirstCandidate,
    /// Every keyword was in cooldown
    LeastRecentlyUsed,
    /// Core topic rotation was due
    CoreRotation,
    /// Nothing is known
    Default,
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::ClusterTarget { cluster_id, score } => {
                write!(f, "cluster {cluster_id} (score {score})")
            }
            SelectionReason::FirstCandidate => write!(f, "first candidate"),
            SelectionReason::LeastRecentlyUsed => write!(f, "least recently used"),
            SelectionReason::CoreRotation => write!(f, "core rotation"),
            SelectionReason::Default => write!(f, "default topic"),
        }
    }
}

/// A selected keyword.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub keyword: String,
    pub reason: SelectionReason,
}

impl Selection {
    fn new(keyword: impl Into<String>, reason: SelectionReason) -> Self {
        Self {
            keyword: keyword.into(),
            reason,
        }
    }
}

/// Borrowed planner state consulted by a selection.
#[derive(Clone, Copy)]
pub struct SelectionContext<'a> {
    pub keywords: &'a KeywordTable,
    pub graph: &'a RelationshipGraph,
    pub clusters: &'a ClusterIndex,
    pub history: &'a UsageHistory,
    pub topic_types: &'a TopicTypes,
    pub rotation: Option<&'a CoreRotation>,
}

/// Selection parameters.
#[derive(Debug, Clone)]
pub struct KeywordSelector {
    cooldown: Duration,
    lookback: Duration,
    default_topic: String,
}

impl KeywordSelector {
    pub fn new(cooldown_days: u32, lookback_days: u32, default_topic: impl Into<String>) -> Self {
        Self {
            cooldown: days(cooldown_days),
            lookback: days(lookback_days),
            default_topic: default_topic.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.cooldown_days,
            settings.diversity_lookback_days,
            settings.default_topic.clone(),
        )
    }

    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    /// Pick the next keyword at `now`.
    pub fn select(&self, ctx: &SelectionContext<'_>, now: DateTime<Utc>) -> Selection {
        if let Some(rotation) = ctx.rotation {
            if rotation.is_due(ctx.history) {
                if let Some(topic) = rotation.next_topic(ctx.history) {
                    debug!(keyword = %topic, "Core topic rotation due");
                    return Selection::new(topic, SelectionReason::CoreRotation);
                }
            }
        }

        if ctx.keywords.is_empty() {
            debug!("No keywords known, using default topic");
            return Selection::new(self.default_topic.as_str(), SelectionReason::Default);
        }

        let available: Vec<&str> = ctx
            .keywords
            .keywords()
            .filter(|k| ctx.history.is_available_at(k, self.cooldown, now))
            .collect();

        if available.is_empty() {
            return self.exhausted(ctx);
        }

        let candidates = self.diversify(ctx, available, now);
        let candidate_set: HashSet<&str> = candidates.iter().copied().collect();

        let tracker = CoverageTracker::new(ctx.keywords, ctx.clusters, ctx.history);
        for (cluster_id, coverage) in tracker.ranked_clusters() {
            let members = ctx.clusters.members(cluster_id).unwrap_or(&[]);
            let best = members
                .iter()
                .map(String::as_str)
                .filter(|m| candidate_set.contains(m))
                .map(|m| (self.score(ctx, m), m))
                .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)));
            if let Some((score, keyword)) = best {
                debug!(
                    keyword = %keyword,
                    cluster_id,
                    coverage = coverage.coverage,
                    score,
                    "Selected keyword from least-covered cluster"
                );
                return Selection::new(keyword, SelectionReason::ClusterTarget { cluster_id, score });
            }
        }

        match candidates.first() {
            Some(keyword) => {
                debug!(keyword = %keyword, "No cluster candidate, using first candidate");
                Selection::new(*keyword, SelectionReason::FirstCandidate)
            }
            None => Selection::new(self.default_topic.as_str(), SelectionReason::Default),
        }
    }

    /// Additive score of a candidate.
    pub fn score(&self, ctx: &SelectionContext<'_>, keyword: &str) -> u32 {
        let type_bonus = if ctx.topic_types.matches(keyword, SPECIFIC_TOPIC_TYPE) {
            3
        } else if ctx.topic_types.matches(keyword, TECHNICAL_TOPIC_TYPE) {
            2
        } else {
            0
        };
        let degree = ctx.graph.degree(keyword).min(MAX_DEGREE_BONUS) as u32;
        type_bonus + ctx.keywords.priority_of(keyword).score() + degree
    }

    /// Drop candidates sharing a topic type with recently used keywords,
    /// unless that would drop all of them.
    fn diversify<'k>(
        &self,
        ctx: &SelectionContext<'_>,
        available: Vec<&'k str>,
        now: DateTime<Utc>,
    ) -> Vec<&'k str> {
        let recent = ctx.history.recent_keywords(self.lookback, now);
        let recent_types: BTreeSet<&str> = ctx.topic_types.classify_all(recent);
        if recent_types.is_empty() {
            return available;
        }
        let diverse: Vec<&str> = available
            .iter()
            .copied()
            .filter(|k| ctx.topic_types.classify(k).is_disjoint(&recent_types))
            .collect();
        if diverse.is_empty() {
            debug!("Diversity filter would remove every candidate, skipping it");
            available
        } else {
            diverse
        }
    }

    /// Every keyword is in cooldown, so each has at least one recorded use.
    fn exhausted(&self, ctx: &SelectionContext<'_>) -> Selection {
        match ctx.history.least_recently_used(ctx.keywords.keywords()) {
            Some(keyword) => {
                warn!(keyword = %keyword, "All keywords in cooldown, using least recently used");
                Selection::new(keyword, SelectionReason::LeastRecentlyUsed)
            }
            None => Selection::new(self.default_topic.as_str(), SelectionReason::Default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::ConnectedComponents;
    use chrono::TimeZone;
    use keyword_types::{KeywordRecord, Priority, RelationshipKind};

    struct Fixture {
        keywords: KeywordTable,
        graph: RelationshipGraph,
        clusters: ClusterIndex,
        history: UsageHistory,
        types: TopicTypes,
    }

    impl Fixture {
        fn new(nodes: &[(&str, Priority)], edges: &[(&str, &str)]) -> Self {
            let mut keywords = KeywordTable::new();
            let mut graph = RelationshipGraph::new();
            for (kw, p) in nodes {
                keywords.insert(kw, KeywordRecord::new(*p, "t", 1, t(0)));
                graph.add_node(kw);
            }
            for (a, b) in edges {
                graph.add_edge(a, b, RelationshipKind::Related, 0.5);
            }
            let mut clusters = ClusterIndex::new();
            clusters
                .recompute(&graph, &keywords, &ConnectedComponents)
                .unwrap();
            Self {
                keywords,
                graph,
                clusters,
                history: UsageHistory::new(),
                types: TopicTypes::new(&Settings::default().topic_types),
            }
        }

        fn ctx(&self) -> SelectionContext<'_> {
            SelectionContext {
                keywords: &self.keywords,
                graph: &self.graph,
                clusters: &self.clusters,
                history: &self.history,
                topic_types: &self.types,
                rotation: None,
            }
        }
    }

    fn t(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn selector() -> KeywordSelector {
        KeywordSelector::new(30, 14, "Web Accessibility")
    }

    #[test]
    fn test_empty_topology_returns_default() {
        let fixture = Fixture::new(&[], &[]);
        let selection = selector().select(&fixture.ctx(), t(0));
        assert_eq!(selection.keyword, "Web Accessibility");
        assert_eq!(selection.reason, SelectionReason::Default);
    }

    #[test]
    fn test_scoring_rules() {
        let fixture = Fixture::new(
            &[
                ("keyboard navigation testing", Priority::Low),
                ("code reviews", Priority::Critical),
                ("plain", Priority::Medium),
                ("n1", Priority::Medium),
                ("n2", Priority::Medium),
                ("n3", Priority::Medium),
                ("n4", Priority::Medium),
            ],
            &[("plain", "n1"), ("plain", "n2"), ("plain", "n3"), ("plain", "n4")],
        );
        let ctx = fixture.ctx();
        // specific and technical do not stack
        assert_eq!(selector().score(&ctx, "keyboard navigation testing"), 3);
        assert_eq!(selector().score(&ctx, "code reviews"), 2 + 3);
        // degree capped at 3
        assert_eq!(selector().score(&ctx, "plain"), 1 + 3);
    }

    #[test]
    fn test_targets_least_covered_cluster() {
        let mut fixture = Fixture::new(
            &[
                ("aaa one", Priority::Medium),
                ("aaa two", Priority::Medium),
                ("bbb one", Priority::Low),
                ("bbb screen readers", Priority::High),
            ],
            &[("aaa one", "aaa two"), ("bbb one", "bbb screen readers")],
        );
        fixture.history.record_use_at("aaa one", t(0));
        let selection = selector().select(&fixture.ctx(), t(60));
        assert_eq!(selection.keyword, "bbb screen readers");
        assert_eq!(
            selection.reason,
            SelectionReason::ClusterTarget {
                cluster_id: fixture.clusters.cluster_of("bbb one").unwrap(),
                score: 3 + 2 + 1
            }
        );
    }

    #[test]
    fn test_score_ties_break_by_keyword() {
        let fixture = Fixture::new(
            &[("zulu", Priority::Medium), ("alpha", Priority::Medium)],
            &[("zulu", "alpha")],
        );
        let selection = selector().select(&fixture.ctx(), t(0));
        assert_eq!(selection.keyword, "alpha");
    }

    #[test]
    fn test_cooldown_excludes_recent_keyword() {
        let mut fixture = Fixture::new(
            &[("alpha", Priority::Critical), ("beta", Priority::Low)],
            &[("alpha", "beta")],
        );
        fixture.history.record_use_at("alpha", t(0));
        let selection = selector().select(&fixture.ctx(), t(10));
        assert_eq!(selection.keyword, "beta");
    }

    #[test]
    fn test_all_in_cooldown_falls_back_to_least_recently_used() {
        let mut fixture = Fixture::new(
            &[("alpha", Priority::Medium), ("beta", Priority::Medium)],
            &[],
        );
        fixture.history.record_use_at("beta", t(0));
        fixture.history.record_use_at("alpha", t(1));
        let selection = selector().select(&fixture.ctx(), t(5));
        assert_eq!(selection.keyword, "beta");
        assert_eq!(selection.reason, SelectionReason::LeastRecentlyUsed);
    }

    #[test]
    fn test_cooldown_exhaustion_with_zero_cooldown_and_future_uses() {
        // Uses after `now` keep keywords in cooldown even with no window
        let mut fixture = Fixture::new(
            &[("gamma", Priority::High), ("delta", Priority::Low)],
            &[],
        );
        fixture.history.record_use_at("delta", t(10));
        fixture.history.record_use_at("gamma", t(12));
        let selection =
            KeywordSelector::new(0, 14, "Web Accessibility").select(&fixture.ctx(), t(0));
        assert_eq!(selection.keyword, "delta");
        assert_eq!(selection.reason, SelectionReason::LeastRecentlyUsed);
    }

    #[test]
    fn test_diversity_filter_avoids_recent_types() {
        let mut fixture = Fixture::new(
            &[
                ("wcag checklist", Priority::Medium),
                ("ada lawsuits", Priority::Critical),
                ("healthcare portals", Priority::Low),
                ("wcag 2.2", Priority::Low),
            ],
            &[],
        );
        // compliance type used recently
        fixture.history.record_use_at("wcag 2.2", t(0));
        let selection = selector().select(&fixture.ctx(), t(5));
        assert_eq!(selection.keyword, "healthcare portals");
    }

    #[test]
    fn test_diversity_skipped_when_it_empties_candidates() {
        let mut fixture = Fixture::new(
            &[("wcag checklist", Priority::Medium), ("wcag 2.2", Priority::Low)],
            &[],
        );
        fixture.history.record_use_at("wcag 2.2", t(0));
        let selection = selector().select(&fixture.ctx(), t(5));
        assert_eq!(selection.keyword, "wcag checklist");
    }

    #[test]
    fn test_first_candidate_without_clusters() {
        let mut fixture = Fixture::new(
            &[("zulu", Priority::Medium), ("alpha", Priority::Critical)],
            &[],
        );
        fixture.clusters = ClusterIndex::new();
        let selection = selector().select(&fixture.ctx(), t(0));
        assert_eq!(selection.keyword, "zulu");
        assert_eq!(selection.reason, SelectionReason::FirstCandidate);
    }

    #[test]
    fn test_core_rotation_when_due() {
        let fixture = Fixture::new(&[("alpha", Priority::Medium)], &[]);
        let rotation = CoreRotation::from_settings(&keyword_types::RotationSettings {
            enabled: true,
            ..Default::default()
        })
        .unwrap();
        let ctx = SelectionContext {
            rotation: Some(&rotation),
            ..fixture.ctx()
        };
        let selection = selector().select(&ctx, t(0));
        assert_eq!(selection.keyword, "Web Accessibility");
        assert_eq!(selection.reason, SelectionReason::CoreRotation);
    }
}
