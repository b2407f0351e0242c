//! Coverage statistics derived from clusters and usage history.
//!
//! A keyword counts as used once it has at least one recorded use, no
//! matter how long ago.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use keyword_types::Priority;

use crate::clusters::{ClusterId, ClusterIndex};
use crate::history::UsageHistory;
use crate::types::KeywordTable;

/// Coverage of one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterCoverage {
    pub total_keywords: usize,
    pub used_keywords: usize,
    /// used / total, 0 for an empty cluster
    pub coverage: f64,
}

impl ClusterCoverage {
    fn new(total_keywords: usize, used_keywords: usize) -> Self {
        Self {
            total_keywords,
            used_keywords,
            coverage: ratio(used_keywords, total_keywords),
        }
    }
}

/// Coverage of one priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorityCoverage {
    pub total: usize,
    pub used: usize,
    /// Percentage in [0, 100]
    pub coverage_percent: f64,
}

/// Snapshot of global coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_keywords: usize,
    pub used_keywords: usize,
    pub unused_keywords: usize,
    /// Percentage in [0, 100]
    pub coverage_percent: f64,
    /// Keyed by priority name, highest priority first
    pub priority_coverage: BTreeMap<Priority, PriorityCoverage>,
    pub cluster_coverage: BTreeMap<ClusterId, ClusterCoverage>,
}

fn ratio(used: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64
    }
}

/// Read-only view computing coverage on demand.
pub struct CoverageTracker<'a> {
    keywords: &'a KeywordTable,
    clusters: &'a ClusterIndex,
    history: &'a UsageHistory,
}

impl<'a> CoverageTracker<'a> {
    pub fn new(
        keywords: &'a KeywordTable,
        clusters: &'a ClusterIndex,
        history: &'a UsageHistory,
    ) -> Self {
        Self {
            keywords,
            clusters,
            history,
        }
    }

    /// Coverage of a cluster. Unknown ids report an empty cluster.
    pub fn cluster_coverage(&self, id: ClusterId) -> ClusterCoverage {
        let members = self.clusters.members(id).unwrap_or(&[]);
        let used = members
            .iter()
            .filter(|k| self.history.has_been_used(k))
            .count();
        ClusterCoverage::new(members.len(), used)
    }

    /// Clusters by coverage ascending, ties by id ascending.
    pub fn ranked_clusters(&self) -> Vec<(ClusterId, ClusterCoverage)> {
        let mut ranked: Vec<(ClusterId, ClusterCoverage)> = self
            .clusters
            .iter()
            .map(|(id, _)| (id, self.cluster_coverage(id)))
            .collect();
        ranked.sort_by(|a, b| {
            a.1.coverage
                .total_cmp(&b.1.coverage)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }

    /// Full coverage report.
    pub fn report(&self) -> CoverageReport {
        let total_keywords = self.keywords.len();
        let mut priority_coverage: BTreeMap<Priority, PriorityCoverage> = BTreeMap::new();
        let mut used_keywords = 0;

        for (keyword, record) in self.keywords.iter() {
            let used = self.history.has_been_used(keyword);
            if used {
                used_keywords += 1;
            }
            let tier = priority_coverage
                .entry(record.priority)
                .or_insert(PriorityCoverage {
                    total: 0,
                    used: 0,
                    coverage_percent: 0.0,
                });
            tier.total += 1;
            if used {
                tier.used += 1;
            }
        }
        for tier in priority_coverage.values_mut() {
            tier.coverage_percent = ratio(tier.used, tier.total) * 100.0;
        }

        let cluster_coverage = self
            .clusters
            .iter()
            .map(|(id, _)| (id, self.cluster_coverage(id)))
            .collect();

        CoverageReport {
            total_keywords,
            used_keywords,
            unused_keywords: total_keywords - used_keywords,
            coverage_percent: ratio(used_keywords, total_keywords) * 100.0,
            priority_coverage,
            cluster_coverage,
        }
    }
}
