//! End-to-end test infrastructure for the keyword planner.
//!
//! Provides a shared TestHarness that owns temp data and context
//! directories, plus helpers for seeding topology files directly.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use keyword_topology::{
    strategy_from_settings, Cluster, ClusterId, ClusterIndex, ContextDirExtractor,
    KeywordExtractor, KeywordPlanner, NoOpOracle, PlannerDeps, RelationshipOracle, TopologyDocument,
    TopologyError, TopologyStore, UsageHistory,
};
use keyword_types::{
    ExtractedKeyword, InferenceSettings, KeywordRecord, Priority, Relationship,
    RelationshipKind, RelationshipProposal, Settings,
};

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Settings pointing at the temp directories, inference disabled
    pub settings: Settings,
    /// Directory scanned by the context extractor
    pub context_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Harness with settings adjusted by `configure`.
    pub fn with_settings(configure: impl FnOnce(&mut Settings)) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("data");
        let context_dir = temp_dir.path().join("context");
        std::fs::create_dir_all(&context_dir).expect("Failed to create context dir");

        let mut settings = Settings {
            data_dir: data_dir.to_string_lossy().into_owned(),
            context_dir: context_dir.to_string_lossy().into_owned(),
            inference: InferenceSettings {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        configure(&mut settings);

        Self {
            _temp_dir: temp_dir,
            settings,
            context_dir,
        }
    }

    pub fn store(&self) -> TopologyStore {
        TopologyStore::from_settings(&self.settings)
    }

    /// Write a file into the context directory.
    pub fn write_context(&self, name: &str, content: &str) {
        std::fs::write(self.context_dir.join(name), content).expect("Failed to write context file");
    }

    /// Open a planner with the context directory extractor and no inference.
    pub fn open(&self) -> KeywordPlanner {
        let extractor = ContextDirExtractor::new(self.context_dir.clone()).expect("Failed to build extractor");
        self.open_with(Arc::new(extractor), Arc::new(NoOpOracle))
    }

    /// Open a planner with explicit collaborators and configured clustering.
    pub fn open_with(
        &self,
        extractor: Arc<dyn KeywordExtractor>,
        oracle: Arc<dyn RelationshipOracle>,
    ) -> KeywordPlanner {
        let deps = PlannerDeps::new(
            extractor,
            oracle,
            Arc::from(strategy_from_settings(&self.settings.clustering)),
        );
        KeywordPlanner::open(&self.settings, deps)
    }

    /// Write a topology document with explicit clusters.
    ///
    /// Every keyword must appear in exactly one of `clusters`.
    pub fn seed_topology(
        &self,
        keywords: &[(&str, Priority)],
        clusters: &[&[&str]],
        relationships: &[(&str, &str, f64)],
    ) {
        let mut document = TopologyDocument::default();
        for (keyword, priority) in keywords {
            document
                .keywords
                .insert(keyword, KeywordRecord::new(*priority, "seed.md", 1, base_time()));
        }
        document.clusters = ClusterIndex::from_clusters(
            clusters
                .iter()
                .enumerate()
                .map(|(id, members)| (id as ClusterId, cluster(members)))
                .collect::<BTreeMap<_, _>>(),
        );
        document.relationships = relationships
            .iter()
            .map(|(a, b, w)| Relationship::new(*a, *b, RelationshipKind::Related, *w))
            .collect();
        self.store()
            .save_topology(&document)
            .expect("Failed to seed topology");
    }

    /// Write a usage history where each keyword was used `days_ago` days
    /// before `base_time()`.
    pub fn seed_usage(&self, uses: &[(&str, i64)]) {
        let mut history = UsageHistory::new();
        let mut ordered: Vec<_> = uses.to_vec();
        ordered.sort_by_key(|(_, days_ago)| std::cmp::Reverse(*days_ago));
        for (keyword, days_ago) in ordered {
            history.record_use_at(keyword, base_time() - Duration::days(days_ago));
        }
        self.store().save_usage(&history).expect("Failed to seed usage");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed reference time for scenarios.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// A cluster record from member names. The alphabetically first member is
/// taken as central.
pub fn cluster(members: &[&str]) -> Cluster {
    let mut keywords: Vec<String> = members.iter().map(|m| m.to_string()).collect();
    keywords.sort();
    Cluster {
        central_keyword: keywords.first().cloned().unwrap_or_default(),
        size: keywords.len(),
        keywords,
        average_priority: 1.0,
    }
}

pub fn extracted(keyword: &str, priority: Priority) -> ExtractedKeyword {
    ExtractedKeyword::new(keyword, priority, "fixture.md", 1)
}

pub fn proposal(keyword: &str, related: &[&str], weight: f64) -> RelationshipProposal {
    RelationshipProposal {
        keyword: keyword.to_string(),
        related: related.iter().map(|r| r.to_string()).collect(),
        relationship_type: RelationshipKind::Related,
        weight,
    }
}

/// Oracle that always fails, standing in for an unreachable LLM.
pub struct UnavailableOracle;

#[async_trait]
impl RelationshipOracle for UnavailableOracle {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn propose(
        &self,
        _new: &[String],
        _existing: &[String],
    ) -> Result<Vec<RelationshipProposal>, TopologyError> {
        Err(TopologyError::Inference("connection refused".to_string()))
    }
}
