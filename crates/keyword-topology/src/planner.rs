//! Keyword planner service.
//!
//! Owns the topology, the usage history and their persistence. Every public
//! operation fails open: errors are logged and a safe default is returned,
//! so keyword planning never blocks content generation.
//!
//! State sits behind one async mutex, held only for short in-memory work.
//! `update_topology` runs under a separate update lock on a copy of the
//! state, so selection keeps answering from the last committed topology
//! while extraction and inference run.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use keyword_types::{normalize_keyword, Settings};

use crate::clustering::{strategy_from_settings, ClusteringStrategy};
use crate::clusters::ClusterIndex;
use crate::coverage::{CoverageReport, CoverageTracker};
use crate::error::TopologyError;
use crate::extraction::{ContextDirExtractor, KeywordExtractor};
use crate::graph::{Neighbor, RelationshipGraph};
use crate::history::UsageHistory;
use crate::oracle::{NoOpOracle, RelationshipOracle};
use crate::rotation::CoreRotation;
use crate::selector::{KeywordSelector, Selection, SelectionContext};
use crate::storage::{TopologyDocument, TopologyStore};
use crate::topic_types::TopicTypes;
use crate::types::{KeywordTable, UpsertOutcome};

/// Collaborators injected into the planner.
#[derive(Clone)]
pub struct PlannerDeps {
    pub extractor: Arc<dyn KeywordExtractor>,
    pub oracle: Arc<dyn RelationshipOracle>,
    pub clustering: Arc<dyn ClusteringStrategy>,
}

impl PlannerDeps {
    pub fn new(
        extractor: Arc<dyn KeywordExtractor>,
        oracle: Arc<dyn RelationshipOracle>,
        clustering: Arc<dyn ClusteringStrategy>,
    ) -> Self {
        Self {
            extractor,
            oracle,
            clustering,
        }
    }

    /// Context directory extraction, no inference, configured clustering.
    pub fn from_settings(settings: &Settings) -> Result<Self, TopologyError> {
        Ok(Self::new(
            Arc::new(ContextDirExtractor::new(settings.expanded_context_dir())?),
            Arc::new(NoOpOracle),
            Arc::from(strategy_from_settings(&settings.clustering)),
        ))
    }

    /// Replace the oracle.
    pub fn with_oracle(mut self, oracle: Arc<dyn RelationshipOracle>) -> Self {
        self.oracle = oracle;
        self
    }
}

/// Result of a topology update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateSummary {
    /// Keywords returned by the extractor
    pub extracted: usize,
    /// Keywords new to the topology
    pub added: usize,
    /// Known keywords whose priority or frequency changed
    pub updated: usize,
    /// Relationships added to the graph
    pub edges_added: usize,
    /// Cluster count after the update
    pub clusters: usize,
}

/// Counts describing the planner state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannerStatus {
    pub keywords: usize,
    pub relationships: usize,
    pub clusters: usize,
    pub used_keywords: usize,
    pub total_uses: usize,
    pub last_updated: DateTime<Utc>,
    pub topology_path: PathBuf,
    pub usage_path: PathBuf,
}

#[derive(Debug, Clone)]
struct PlannerState {
    version: String,
    last_updated: DateTime<Utc>,
    keywords: KeywordTable,
    graph: RelationshipGraph,
    clusters: ClusterIndex,
    history: UsageHistory,
}

impl PlannerState {
    fn document(&self) -> TopologyDocument {
        TopologyDocument {
            version: self.version.clone(),
            last_updated: self.last_updated,
            keywords: self.keywords.clone(),
            clusters: self.clusters.clone(),
            relationships: self.graph.relationships(),
        }
    }
}

/// Shared handle to the keyword planner.
#[derive(Clone)]
pub struct KeywordPlanner {
    state: Arc<Mutex<PlannerState>>,
    update_lock: Arc<Mutex<()>>,
    deps: PlannerDeps,
    store: TopologyStore,
    selector: KeywordSelector,
    topic_types: TopicTypes,
    rotation: Option<CoreRotation>,
    max_existing_keywords: usize,
}

impl KeywordPlanner {
    /// Load persisted state and build the planner.
    ///
    /// Unreadable files are logged and replaced by empty state.
    #[instrument(skip_all)]
    pub fn open(settings: &Settings, deps: PlannerDeps) -> Self {
        let store = TopologyStore::from_settings(settings);

        let document = store.load_topology().unwrap_or_else(|e| {
            warn!(error = %e, path = %store.topology_path().display(), "Failed to load topology, starting empty");
            TopologyDocument::default()
        });
        let history = store.load_usage().unwrap_or_else(|e| {
            warn!(error = %e, path = %store.usage_path().display(), "Failed to load usage history, starting empty");
            UsageHistory::new()
        });

        let (graph, dropped) =
            RelationshipGraph::from_parts(&document.keywords, &document.relationships);
        if dropped > 0 {
            debug!(dropped, "Dropped stored relationships that could not be added");
        }

        let mut clusters = document.clusters;
        if !clusters.partitions(&document.keywords) {
            debug!("Stored clusters do not match the keyword set, recomputing");
            // A failure keeps the stored clusters, already logged
            let _ = clusters.recompute(&graph, &document.keywords, deps.clustering.as_ref());
        }

        info!(
            keywords = document.keywords.len(),
            relationships = graph.edge_count(),
            clusters = clusters.len(),
            tracked = history.tracked_keywords().count(),
            "Keyword planner opened"
        );

        let state = PlannerState {
            version: document.version,
            last_updated: document.last_updated,
            keywords: document.keywords,
            graph,
            clusters,
            history,
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            update_lock: Arc::new(Mutex::new(())),
            deps,
            store,
            selector: KeywordSelector::from_settings(settings),
            topic_types: TopicTypes::new(&settings.topic_types),
            rotation: CoreRotation::from_settings(&settings.rotation),
            max_existing_keywords: settings.inference.max_existing_keywords,
        }
    }

    /// Flush topology and usage history to disk.
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<(), TopologyError> {
        let state = self.state.lock().await;
        self.store.save_topology(&state.document())?;
        self.store.save_usage(&state.history)?;
        info!("Keyword planner closed");
        Ok(())
    }

    /// Pick the next keyword to write about.
    pub async fn next_keyword(&self) -> String {
        self.next_keyword_at(Utc::now()).await
    }

    /// Pick the next keyword at an explicit time.
    pub async fn next_keyword_at(&self, now: DateTime<Utc>) -> String {
        self.select_at(now).await.keyword
    }

    /// Pick the next keyword at `now`, with the reason.
    #[instrument(skip(self))]
    pub async fn select_at(&self, now: DateTime<Utc>) -> Selection {
        let state = self.state.lock().await;
        let ctx = SelectionContext {
            keywords: &state.keywords,
            graph: &state.graph,
            clusters: &state.clusters,
            history: &state.history,
            topic_types: &self.topic_types,
            rotation: self.rotation.as_ref(),
        };
        let selection = self.selector.select(&ctx, now);
        info!(keyword = %selection.keyword, reason = %selection.reason, "Selected keyword");
        selection
    }

    /// Record that a keyword was used now.
    pub async fn record_keyword_use(&self, keyword: &str) {
        self.record_keyword_use_at(keyword, Utc::now()).await
    }

    /// Record that a keyword was used at `now` and persist the history.
    #[instrument(skip(self))]
    pub async fn record_keyword_use_at(&self, keyword: &str, now: DateTime<Utc>) {
        if normalize_keyword(keyword).is_empty() {
            warn!("Ignoring use of blank keyword");
            return;
        }
        let mut state = self.state.lock().await;
        let stored = state.history.record_use_at(keyword, now);
        debug!(at = %stored, "Recorded keyword use");
        if let Err(e) = self.store.save_usage(&state.history) {
            warn!(error = %e, "Failed to persist usage history");
        }
    }

    /// Coverage snapshot.
    pub async fn coverage_report(&self) -> CoverageReport {
        let state = self.state.lock().await;
        CoverageTracker::new(&state.keywords, &state.clusters, &state.history).report()
    }

    /// Re-extract keywords, infer relationships for new ones and recluster.
    ///
    /// Uses recorded while the update runs are kept on commit.
    #[instrument(skip(self))]
    pub async fn update_topology(&self) -> UpdateSummary {
        let _update = self.update_lock.lock().await;
        let mut working = self.state.lock().await.clone();
        let mut summary = UpdateSummary {
            clusters: working.clusters.len(),
            ..UpdateSummary::default()
        };

        let extracted = match self.deps.extractor.extract() {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(error = %e, "Keyword extraction failed, topology unchanged");
                return summary;
            }
        };
        summary.extracted = extracted.len();
        if extracted.is_empty() {
            warn!("No keywords extracted, topology unchanged");
            return summary;
        }

        let now = Utc::now();
        let mut new_keywords: Vec<String> = Vec::new();
        for keyword in &extracted {
            match working.keywords.upsert(keyword, now) {
                UpsertOutcome::Added => {
                    summary.added += 1;
                    new_keywords.push(keyword.keyword.clone());
                }
                UpsertOutcome::Updated => summary.updated += 1,
                UpsertOutcome::Unchanged | UpsertOutcome::Ignored => {}
            }
        }
        for keyword in &new_keywords {
            working.graph.add_node(keyword);
        }

        if !new_keywords.is_empty() {
            let fresh: HashSet<&str> = new_keywords.iter().map(String::as_str).collect();
            let existing: Vec<String> = working
                .keywords
                .keywords()
                .filter(|k| !fresh.contains(k))
                .take(self.max_existing_keywords)
                .map(str::to_string)
                .collect();

            match self.deps.oracle.propose(&new_keywords, &existing).await {
                Ok(proposals) => {
                    for proposal in &proposals {
                        for related in &proposal.related {
                            let outcome = working.graph.add_edge(
                                &proposal.keyword,
                                related,
                                proposal.relationship_type,
                                proposal.weight,
                            );
                            if outcome.is_added() {
                                summary.edges_added += 1;
                            }
                        }
                    }
                    debug!(
                        oracle = self.deps.oracle.name(),
                        proposals = proposals.len(),
                        edges = summary.edges_added,
                        "Applied relationship proposals"
                    );
                }
                Err(e) => warn!(
                    oracle = self.deps.oracle.name(),
                    error = %e,
                    "Relationship inference unavailable, skipping new edges"
                ),
            }
        }

        let changed = summary.added > 0 || summary.updated > 0 || summary.edges_added > 0;
        if changed || working.clusters.is_empty() {
            // Failure keeps the previous clusters and is logged by the index
            let PlannerState {
                keywords,
                graph,
                clusters,
                ..
            } = &mut working;
            let _ = clusters.recompute(graph, keywords, self.deps.clustering.as_ref());
        }
        summary.clusters = working.clusters.len();

        working.last_updated = now;
        let mut state = self.state.lock().await;
        working.history = std::mem::take(&mut state.history);
        if let Err(e) = self.store.save_topology(&working.document()) {
            warn!(error = %e, "Failed to persist topology");
        }
        *state = working;
        drop(state);

        info!(
            extracted = summary.extracted,
            added = summary.added,
            updated = summary.updated,
            edges_added = summary.edges_added,
            clusters = summary.clusters,
            "Topology updated"
        );
        summary
    }

    /// Neighbors of a keyword, strongest first.
    pub async fn related(&self, keyword: &str) -> Vec<Neighbor> {
        let state = self.state.lock().await;
        state.graph.neighbors(keyword, &state.keywords)
    }

    /// Current counts.
    pub async fn status(&self) -> PlannerStatus {
        let state = self.state.lock().await;
        PlannerStatus {
            keywords: state.keywords.len(),
            relationships: state.graph.edge_count(),
            clusters: state.clusters.len(),
            used_keywords: state
                .keywords
                .keywords()
                .filter(|k| state.history.has_been_used(k))
                .count(),
            total_uses: state.history.total_uses(),
            last_updated: state.last_updated,
            topology_path: self.store.topology_path().to_path_buf(),
            usage_path: self.store.usage_path().to_path_buf(),
        }
    }
}
