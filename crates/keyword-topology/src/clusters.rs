//! Cluster index: the current partition of known keywords.
//!
//! Clusters are recomputed wholesale from the relationship graph. A failed
//! recompute keeps the previous assignment.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{info, instrument, warn};

use keyword_types::normalize_keyword;

use crate::clustering::ClusteringStrategy;
use crate::error::TopologyError;
use crate::graph::RelationshipGraph;
use crate::types::KeywordTable;

/// Cluster identifier, dense from 0.
pub type ClusterId = u32;

/// A group of related keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Members, sorted
    pub keywords: Vec<String>,
    /// Highest-degree member
    #[serde(alias = "centralKeyword")]
    pub central_keyword: String,
    /// Number of members
    pub size: usize,
    /// Mean priority score of the members
    #[serde(alias = "averagePriority")]
    pub average_priority: f64,
}

impl Cluster {
    fn build(mut keywords: Vec<String>, graph: &RelationshipGraph, table: &KeywordTable) -> Self {
        keywords.sort();
        let central_keyword = keywords
            .iter()
            .max_by(|a, b| graph.degree(a).cmp(&graph.degree(b)).then_with(|| b.cmp(a)))
            .cloned()
            .unwrap_or_default();
        let average_priority = if keywords.is_empty() {
            0.0
        } else {
            let sum: u32 = keywords.iter().map(|k| table.priority_of(k).score()).sum();
            f64::from(sum) / keywords.len() as f64
        };
        Self {
            size: keywords.len(),
            keywords,
            central_keyword,
            average_priority,
        }
    }
}

/// Keyword to cluster assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterIndex {
    clusters: BTreeMap<ClusterId, Cluster>,
    membership: HashMap<String, ClusterId>,
}

impl ClusterIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from stored clusters.
    ///
    /// Members are normalized. A keyword listed in several clusters stays in
    /// the first one, and clusters left without members are dropped.
    pub fn from_clusters(clusters: BTreeMap<ClusterId, Cluster>) -> Self {
        let mut membership = HashMap::new();
        let mut normalized = BTreeMap::new();
        for (id, mut cluster) in clusters {
            let mut keywords: Vec<String> = Vec::with_capacity(cluster.keywords.len());
            for keyword in &cluster.keywords {
                let keyword = normalize_keyword(keyword);
                if keyword.is_empty() || membership.contains_key(&keyword) {
                    continue;
                }
                membership.insert(keyword.clone(), id);
                keywords.push(keyword);
            }
            if keywords.is_empty() {
                continue;
            }
            keywords.sort();
            cluster.central_keyword = normalize_keyword(&cluster.central_keyword);
            if !keywords.contains(&cluster.central_keyword) {
                cluster.central_keyword = keywords[0].clone();
            }
            cluster.size = keywords.len();
            cluster.keywords = keywords;
            normalized.insert(id, cluster);
        }
        Self {
            clusters: normalized,
            membership,
        }
    }

    /// True when the members of all clusters are exactly `keywords`.
    pub fn partitions(&self, keywords: &KeywordTable) -> bool {
        self.membership.len() == keywords.len()
            && keywords.keywords().all(|k| self.membership.contains_key(k))
    }

    /// Replace the assignment with a fresh partition of `keywords`.
    ///
    /// Every known keyword lands in exactly one cluster. Keywords the
    /// strategy did not place become singletons. On strategy failure the
    /// previous assignment is kept and the error returned.
    #[instrument(skip_all, fields(strategy = strategy.name()))]
    pub fn recompute(
        &mut self,
        graph: &RelationshipGraph,
        keywords: &KeywordTable,
        strategy: &dyn ClusteringStrategy,
    ) -> Result<usize, TopologyError> {
        let groups = match strategy.partition(graph) {
            Ok(groups) => groups,
            Err(e) => {
                warn!(error = %e, "Clustering failed, keeping previous clusters");
                return Err(e);
            }
        };

        let mut placed: HashSet<String> = HashSet::new();
        let mut members: Vec<Vec<String>> = Vec::new();
        for group in groups {
            let kept: Vec<String> = group
                .iter()
                .map(|k| normalize_keyword(k))
                .filter(|k| keywords.contains(k) && placed.insert(k.clone()))
                .collect();
            if !kept.is_empty() {
                members.push(kept);
            }
        }
        for keyword in keywords.keywords() {
            if placed.insert(keyword.to_string()) {
                members.push(vec![keyword.to_string()]);
            }
        }

        let mut clusters: Vec<Cluster> = members
            .into_iter()
            .map(|m| Cluster::build(m, graph, keywords))
            .collect();
        clusters.sort_by(|a, b| a.keywords[0].cmp(&b.keywords[0]));

        *self = Self::from_clusters(
            clusters
                .into_iter()
                .enumerate()
                .map(|(id, c)| (id as ClusterId, c))
                .collect(),
        );
        info!(clusters = self.len(), "Recomputed clusters");
        Ok(self.len())
    }

    /// Cluster containing a keyword.
    pub fn cluster_of(&self, keyword: &str) -> Option<ClusterId> {
        self.membership.get(&normalize_keyword(keyword)).copied()
    }

    /// Members of a cluster.
    pub fn members(&self, id: ClusterId) -> Option<&[String]> {
        self.clusters.get(&id).map(|c| c.keywords.as_slice())
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    /// Clusters in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ClusterId, &Cluster)> {
        self.clusters.iter().map(|(id, c)| (*id, c))
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

impl Serialize for ClusterIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.clusters.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ClusterIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let clusters = BTreeMap::<ClusterId, Cluster>::deserialize(deserializer)?;
        Ok(Self::from_clusters(clusters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{ConnectedComponents, LouvainClustering};
    use chrono::Utc;
    use keyword_types::{KeywordRecord, Priority, RelationshipKind};

    struct Broken;

    impl ClusteringStrategy for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn partition(&self, _: &RelationshipGraph) -> Result<Vec<Vec<String>>, TopologyError> {
            Err(TopologyError::Clustering("unavailable".into()))
        }
    }

    fn fixture() -> (KeywordTable, RelationshipGraph) {
        let mut table = KeywordTable::new();
        let mut graph = RelationshipGraph::new();
        for (kw, p) in [
            ("wcag", Priority::Critical),
            ("ada compliance", Priority::High),
            ("section 508", Priority::Medium),
            ("color contrast", Priority::Low),
        ] {
            table.insert(kw, KeywordRecord::new(p, "t", 1, Utc::now()));
            graph.add_node(kw);
        }
        graph.add_edge("wcag", "ada compliance", RelationshipKind::Sibling, 0.9);
        graph.add_edge("wcag", "section 508", RelationshipKind::Sibling, 0.8);
        (table, graph)
    }

    #[test]
    fn test_recompute_partitions_all_keywords() {
        let (table, graph) = fixture();
        let mut index = ClusterIndex::new();
        index.recompute(&graph, &table, &ConnectedComponents).unwrap();

        assert_eq!(index.len(), 2);
        let mut seen: Vec<&str> = index
            .iter()
            .flat_map(|(_, c)| c.keywords.iter().map(String::as_str))
            .collect();
        seen.sort();
        assert_eq!(
            seen,
            vec!["ada compliance", "color contrast", "section 508", "wcag"]
        );
        for kw in table.keywords() {
            assert!(index.cluster_of(kw).is_some());
        }
    }

    #[test]
    fn test_central_keyword_and_average_priority() {
        let (table, graph) = fixture();
        let mut index = ClusterIndex::new();
        index.recompute(&graph, &table, &ConnectedComponents).unwrap();

        let id = index.cluster_of("WCAG").unwrap();
        let cluster = index.get(id).unwrap();
        assert_eq!(cluster.central_keyword, "wcag");
        assert_eq!(cluster.size, 3);
        assert!((cluster.average_priority - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_central_keyword_tie_breaks_lexicographically() {
        let mut table = KeywordTable::new();
        let mut graph = RelationshipGraph::new();
        for kw in ["zebra", "apple"] {
            table.insert(kw, KeywordRecord::new(Priority::Medium, "t", 1, Utc::now()));
            graph.add_node(kw);
        }
        graph.add_edge("zebra", "apple", RelationshipKind::Related, 1.0);
        let mut index = ClusterIndex::new();
        index.recompute(&graph, &table, &LouvainClustering::default()).unwrap();
        assert_eq!(index.get(0).unwrap().central_keyword, "apple");
    }

    #[test]
    fn test_failed_recompute_keeps_previous_assignment() {
        let (table, graph) = fixture();
        let mut index = ClusterIndex::new();
        index.recompute(&graph, &table, &ConnectedComponents).unwrap();
        let before = index.clone();

        assert!(index.recompute(&graph, &table, &Broken).is_err());
        assert_eq!(index, before);
    }

    #[test]
    fn test_serde_uses_string_ids() {
        let (table, graph) = fixture();
        let mut index = ClusterIndex::new();
        index.recompute(&graph, &table, &ConnectedComponents).unwrap();

        let value = serde_json::to_value(&index).unwrap();
        assert!(value.get("0").is_some());
        assert!(value["0"]["central_keyword"].is_string());

        let parsed: ClusterIndex = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_reads_camel_case_clusters() {
        let json = r#"{"3": {"keywords": ["wcag"], "centralKeyword": "wcag", "size": 1, "averagePriority": 3.0}}"#;
        let index: ClusterIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.cluster_of("wcag"), Some(3));
    }

    #[test]
    fn test_stored_members_are_normalized() {
        let json = r#"{
            "0": {"keywords": ["Zulu Topic"], "central_keyword": "Zulu Topic", "size": 1, "average_priority": 0.0},
            "1": {"keywords": ["Alpha Topic", "zulu topic", "  "], "central_keyword": "Alpha Topic", "size": 3, "average_priority": 1.5}
        }"#;
        let index: ClusterIndex = serde_json::from_str(json).unwrap();

        assert_eq!(index.members(0), Some(&["zulu topic".to_string()][..]));
        let alpha = index.get(1).unwrap();
        assert_eq!(alpha.keywords, vec!["alpha topic".to_string()]);
        assert_eq!(alpha.central_keyword, "alpha topic");
        assert_eq!(alpha.size, 1);
    }

    #[test]
    fn test_partitions_detects_stale_members() {
        let (table, graph) = fixture();
        let mut index = ClusterIndex::new();
        index.recompute(&graph, &table, &ConnectedComponents).unwrap();
        assert!(index.partitions(&table));

        let mut stored: BTreeMap<ClusterId, Cluster> =
            index.iter().map(|(id, c)| (id, c.clone())).collect();
        if let Some(cluster) = stored.get_mut(&0) {
            cluster.keywords.push("ghost topic".to_string());
        }
        let with_ghost = ClusterIndex::from_clusters(stored);
        assert!(!with_ghost.partitions(&table));

        let mut smaller = KeywordTable::new();
        smaller.insert("wcag", KeywordRecord::new(Priority::Critical, "t", 1, Utc::now()));
        assert!(!index.partitions(&smaller));
    }
}
