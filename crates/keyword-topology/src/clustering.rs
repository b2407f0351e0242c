//! Community detection over the relationship graph.
//!
//! Strategies partition every graph node into exactly one cluster.
//! Isolated nodes become singleton clusters.
//!
//! ## Louvain
//!
//! Multi-level modularity optimization on the weighted graph. The gain of
//! moving node `i` into community `C` is
//!
//! ```text
//! gain(i, C) = k_i_in(C) - resolution * tot(C) * k_i / 2m
//! ```
//!
//! Results are deterministic: nodes are visited in lexicographic keyword
//! order, equal gains resolve toward the smallest community index, and
//! output clusters are ordered by their lexicographically smallest member.

use std::collections::{BTreeMap, HashMap};

use petgraph::unionfind::UnionFind;
use tracing::{debug, warn};

use keyword_types::{ClusteringSettings, ClusteringStrategyKind};

use crate::error::TopologyError;
use crate::graph::RelationshipGraph;

/// Gains closer than this are treated as equal.
const GAIN_EPSILON: f64 = 1e-12;

/// Upper bound on local-moving passes per level.
const MAX_PASSES: usize = 128;

/// A graph partitioning algorithm.
pub trait ClusteringStrategy: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &str;

    /// Partition all graph nodes into clusters.
    fn partition(&self, graph: &RelationshipGraph) -> Result<Vec<Vec<String>>, TopologyError>;
}

/// Build the configured strategy.
///
/// Louvain is wrapped so that connected components take over if it fails.
pub fn strategy_from_settings(settings: &ClusteringSettings) -> Box<dyn ClusteringStrategy> {
    match settings.strategy {
        ClusteringStrategyKind::Louvain => Box::new(FallbackClustering::new(
            Box::new(LouvainClustering::new(settings.resolution, settings.max_levels)),
            Box::new(ConnectedComponents),
        )),
        ClusteringStrategyKind::Components => Box::new(ConnectedComponents),
    }
}

/// Dense integer view of a graph: nodes sorted by keyword.
struct IndexedGraph {
    names: Vec<String>,
    adj: Vec<Vec<(usize, f64)>>,
}

impl IndexedGraph {
    fn from_graph(graph: &RelationshipGraph) -> Self {
        let mut names: Vec<String> = graph.keywords().map(str::to_string).collect();
        names.sort();
        let position: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let mut adj = vec![Vec::new(); names.len()];
        for (a, b, w) in graph.weighted_edges() {
            if let (Some(&i), Some(&j)) = (position.get(a), position.get(b)) {
                adj[i].push((j, w));
                adj[j].push((i, w));
            }
        }
        Self { names, adj }
    }

    /// Group node indices by label; groups ordered by smallest member.
    fn groups(&self, labels: &[usize]) -> Vec<Vec<String>> {
        let mut by_label: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (node, &label) in labels.iter().enumerate() {
            by_label.entry(label).or_default().push(node);
        }
        let mut groups: Vec<Vec<usize>> = by_label.into_values().collect();
        // Members are pushed in index order, so the first one is the smallest
        groups.sort_by_key(|g| g[0]);
        groups
            .into_iter()
            .map(|g| g.into_iter().map(|i| self.names[i].clone()).collect())
            .collect()
    }
}

/// One level of the Louvain hierarchy.
#[derive(Debug, Clone)]
struct Level {
    adj: Vec<Vec<(usize, f64)>>,
    loops: Vec<f64>,
}

impl Level {
    fn len(&self) -> usize {
        self.adj.len()
    }

    fn degree(&self, i: usize) -> f64 {
        self.adj[i].iter().map(|(_, w)| w).sum::<f64>() + 2.0 * self.loops[i]
    }

    /// Local moving phase. Returns dense community labels and whether any
    /// node changed community.
    fn local_moves(&self, resolution: f64) -> (Vec<usize>, bool) {
        let n = self.len();
        let k: Vec<f64> = (0..n).map(|i| self.degree(i)).collect();
        let m2: f64 = k.iter().sum();
        let mut community: Vec<usize> = (0..n).collect();
        if m2 <= 0.0 {
            return (community, false);
        }
        let mut tot = k.clone();
        let mut moved_any = false;

        for _ in 0..MAX_PASSES {
            let mut moved = false;
            for i in 0..n {
                let current = community[i];
                let mut links: BTreeMap<usize, f64> = BTreeMap::new();
                for &(j, w) in &self.adj[i] {
                    if j != i {
                        *links.entry(community[j]).or_insert(0.0) += w;
                    }
                }

                tot[current] -= k[i];
                let gain = |c: usize, w_in: f64| w_in - resolution * tot[c] * k[i] / m2;

                let mut best = current;
                let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
                for (&c, &w_in) in &links {
                    let g = gain(c, w_in);
                    if g > best_gain + GAIN_EPSILON
                        || ((g - best_gain).abs() <= GAIN_EPSILON && c < best)
                    {
                        best = c;
                        best_gain = g;
                    }
                }

                tot[best] += k[i];
                if best != current {
                    community[i] = best;
                    moved = true;
                    moved_any = true;
                }
            }
            if !moved {
                break;
            }
        }

        (renumber(&community), moved_any)
    }

    /// Collapse communities into single nodes.
    fn aggregate(&self, community: &[usize], count: usize) -> Level {
        let mut weights: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
        let mut loops = vec![0.0; count];
        for i in 0..self.len() {
            let ci = community[i];
            loops[ci] += self.loops[i];
            for &(j, w) in &self.adj[i] {
                let cj = community[j];
                if ci == cj {
                    // Each internal edge is seen from both endpoints
                    loops[ci] += w / 2.0;
                } else {
                    *weights[ci].entry(cj).or_insert(0.0) += w;
                }
            }
        }
        Level {
            adj: weights.into_iter().map(|m| m.into_iter().collect()).collect(),
            loops,
        }
    }
}

/// Relabel communities densely in order of first appearance.
fn renumber(community: &[usize]) -> Vec<usize> {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    community
        .iter()
        .map(|c| {
            let next = mapping.len();
            *mapping.entry(*c).or_insert(next)
        })
        .collect()
}

/// Weighted multi-level Louvain community detection.
#[derive(Debug, Clone)]
pub struct LouvainClustering {
    resolution: f64,
    max_levels: usize,
}

impl Default for LouvainClustering {
    fn default() -> Self {
        Self::new(1.0, 16)
    }
}

impl LouvainClustering {
    pub fn new(resolution: f64, max_levels: usize) -> Self {
        Self {
            resolution,
            max_levels,
        }
    }
}

impl ClusteringStrategy for LouvainClustering {
    fn name(&self) -> &str {
        "louvain"
    }

    fn partition(&self, graph: &RelationshipGraph) -> Result<Vec<Vec<String>>, TopologyError> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(TopologyError::Clustering(format!(
                "resolution must be > 0, got {}",
                self.resolution
            )));
        }
        let indexed = IndexedGraph::from_graph(graph);
        let n = indexed.names.len();
        let mut membership: Vec<usize> = (0..n).collect();
        let mut level = Level {
            adj: indexed.adj.clone(),
            loops: vec![0.0; n],
        };

        for depth in 0..self.max_levels {
            let (community, moved) = level.local_moves(self.resolution);
            if !moved {
                break;
            }
            let count = community.iter().max().map_or(0, |m| m + 1);
            for m in membership.iter_mut() {
                *m = community[*m];
            }
            debug!(level = depth, communities = count, "Louvain level complete");
            if count == level.len() {
                break;
            }
            level = level.aggregate(&community, count);
        }

        Ok(indexed.groups(&membership))
    }
}

/// One cluster per connected component.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectedComponents;

impl ClusteringStrategy for ConnectedComponents {
    fn name(&self) -> &str {
        "connected_components"
    }

    fn partition(&self, graph: &RelationshipGraph) -> Result<Vec<Vec<String>>, TopologyError> {
        let indexed = IndexedGraph::from_graph(graph);
        let mut sets = UnionFind::<usize>::new(indexed.names.len());
        for (i, edges) in indexed.adj.iter().enumerate() {
            for &(j, _) in edges {
                sets.union(i, j);
            }
        }
        Ok(indexed.groups(&sets.into_labeling()))
    }
}

/// Runs `fallback` when `primary` fails.
pub struct FallbackClustering {
    primary: Box<dyn ClusteringStrategy>,
    fallback: Box<dyn ClusteringStrategy>,
}

impl FallbackClustering {
    pub fn new(primary: Box<dyn ClusteringStrategy>, fallback: Box<dyn ClusteringStrategy>) -> Self {
        Self { primary, fallback }
    }
}

impl ClusteringStrategy for FallbackClustering {
    fn name(&self) -> &str {
        self.primary.name()
    }

    fn partition(&self, graph: &RelationshipGraph) -> Result<Vec<Vec<String>>, TopologyError> {
        match self.primary.partition(graph) {
            Ok(clusters) => Ok(clusters),
            Err(e) => {
                warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "Clustering strategy failed, using fallback"
                );
                self.fallback.partition(graph)
            }
        }
    }
}

/// Modularity of a partition (resolution 1).
///
/// Nodes missing from `partition` count as singletons. Returns 0 for a
/// graph without edges.
pub fn modularity(graph: &RelationshipGraph, partition: &[Vec<String>]) -> f64 {
    let mut label: HashMap<&str, usize> = HashMap::new();
    for (c, members) in partition.iter().enumerate() {
        for m in members {
            label.insert(m.as_str(), c);
        }
    }
    let mut next = partition.len();
    for keyword in graph.keywords() {
        label.entry(keyword).or_insert_with(|| {
            next += 1;
            next
        });
    }

    let m2 = 2.0 * graph.total_weight();
    if m2 <= 0.0 {
        return 0.0;
    }
    let mut internal: HashMap<usize, f64> = HashMap::new();
    let mut tot: HashMap<usize, f64> = HashMap::new();
    for (a, b, w) in graph.weighted_edges() {
        let (ca, cb) = (label[a], label[b]);
        *tot.entry(ca).or_insert(0.0) += w;
        *tot.entry(cb).or_insert(0.0) += w;
        if ca == cb {
            *internal.entry(ca).or_insert(0.0) += 2.0 * w;
        }
    }
    tot.iter()
        .map(|(c, t)| internal.get(c).copied().unwrap_or(0.0) / m2 - (t / m2).powi(2))
        .sum()
}
