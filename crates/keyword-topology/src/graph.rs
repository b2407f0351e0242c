//! Undirected keyword relationship graph.
//!
//! Nodes are normalized keywords. Each unordered pair carries at most one
//! edge; the first proposal for a pair wins and later ones are dropped.

use std::collections::HashMap;

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use tracing::debug;

use keyword_types::{normalize_keyword, Priority, Relationship, RelationshipKind};

use crate::types::KeywordTable;

/// Edge payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeData {
    pub kind: RelationshipKind,
    pub weight: f64,
}

/// What happened to an `add_edge` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// Edge was created
    Added,
    /// One of the endpoints is not a node
    MissingEndpoint,
    /// The pair is already connected (in either direction)
    Duplicate,
    /// Both endpoints are the same keyword
    SelfLoop,
    /// Weight outside (0, 1]
    InvalidWeight,
}

impl EdgeOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, EdgeOutcome::Added)
    }
}

/// A neighbor of a keyword as seen from that keyword.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub keyword: String,
    pub weight: f64,
    pub kind: RelationshipKind,
    pub priority: Priority,
}

/// Keyword relationship graph.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    graph: UnGraph<String, EdgeData>,
    index: HashMap<String, NodeIndex>,
}

impl RelationshipGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a keyword table and stored relationships.
    ///
    /// Returns the graph and the number of relationships that were dropped.
    pub fn from_parts<'a, I>(keywords: &KeywordTable, relationships: I) -> (Self, usize)
    where
        I: IntoIterator<Item = &'a Relationship>,
    {
        let mut graph = Self::new();
        for keyword in keywords.keywords() {
            graph.add_node(keyword);
        }
        let mut dropped = 0;
        for rel in relationships {
            if !graph
                .add_edge(&rel.source, &rel.target, rel.kind, rel.weight)
                .is_added()
            {
                dropped += 1;
            }
        }
        (graph, dropped)
    }

    /// Add a keyword node. Returns false when it already existed.
    pub fn add_node(&mut self, keyword: &str) -> bool {
        let key = normalize_keyword(keyword);
        if key.is_empty() || self.index.contains_key(&key) {
            return false;
        }
        let idx = self.graph.add_node(key.clone());
        self.index.insert(key, idx);
        true
    }

    /// Connect two existing keywords.
    pub fn add_edge(&mut self, a: &str, b: &str, kind: RelationshipKind, weight: f64) -> EdgeOutcome {
        let (a, b) = (normalize_keyword(a), normalize_keyword(b));
        let (Some(&ia), Some(&ib)) = (self.index.get(&a), self.index.get(&b)) else {
            debug!(source = %a, target = %b, "Dropping edge with unknown endpoint");
            return EdgeOutcome::MissingEndpoint;
        };
        if ia == ib {
            debug!(keyword = %a, "Dropping self-loop");
            return EdgeOutcome::SelfLoop;
        }
        if !(weight.is_finite() && weight > 0.0 && weight <= 1.0) {
            debug!(source = %a, target = %b, weight, "Dropping edge with invalid weight");
            return EdgeOutcome::InvalidWeight;
        }
        if self.graph.find_edge(ia, ib).is_some() {
            debug!(source = %a, target = %b, "Edge already exists");
            return EdgeOutcome::Duplicate;
        }
        self.graph.add_edge(ia, ib, EdgeData { kind, weight });
        EdgeOutcome::Added
    }

    /// Check whether a keyword is a node.
    pub fn contains(&self, keyword: &str) -> bool {
        self.index.contains_key(&normalize_keyword(keyword))
    }

    /// Neighbors sorted by weight descending, ties in edge insertion order.
    ///
    /// Unknown keywords have no neighbors.
    pub fn neighbors(&self, keyword: &str, keywords: &KeywordTable) -> Vec<Neighbor> {
        let Some(&idx) = self.index.get(&normalize_keyword(keyword)) else {
            return Vec::new();
        };
        let mut edges: Vec<(EdgeIndex, NodeIndex, EdgeData)> = self
            .graph
            .edges(idx)
            .map(|e| {
                let other = if e.source() == idx { e.target() } else { e.source() };
                (e.id(), other, *e.weight())
            })
            .collect();
        edges.sort_by(|a, b| b.2.weight.total_cmp(&a.2.weight).then_with(|| a.0.cmp(&b.0)));
        edges
            .into_iter()
            .map(|(_, other, data)| {
                let name = &self.graph[other];
                Neighbor {
                    keyword: name.clone(),
                    weight: data.weight,
                    kind: data.kind,
                    priority: keywords.priority_of(name),
                }
            })
            .collect()
    }

    /// Number of neighbors, 0 for unknown keywords.
    pub fn degree(&self, keyword: &str) -> usize {
        self.index
            .get(&normalize_keyword(keyword))
            .map(|&idx| self.graph.edges(idx).count())
            .unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node keywords in insertion order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    /// Edges as `(source, target, weight)` in insertion order.
    pub fn weighted_edges(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.graph.edge_references().map(|e| {
            (
                self.graph[e.source()].as_str(),
                self.graph[e.target()].as_str(),
                e.weight().weight,
            )
        })
    }

    /// Edges as persisted relationships in insertion order.
    pub fn relationships(&self) -> Vec<Relationship> {
        self.graph
            .edge_references()
            .map(|e| {
                Relationship::new(
                    self.graph[e.source()].clone(),
                    self.graph[e.target()].clone(),
                    e.weight().kind,
                    e.weight().weight,
                )
            })
            .collect()
    }

    /// Sum of all edge weights.
    pub fn total_weight(&self) -> f64 {
        self.graph.edge_weights().map(|e| e.weight).sum()
    }
}
