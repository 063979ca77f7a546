//! k-NN similarity graph construction
//!
//! Every node is self-queried against the full index with `k + 1`
//! neighbors, the self match is dropped and the first `k` survivors become
//! its outgoing edges. Edge weights are always "higher is more similar".

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{AtlasError, Result};
use crate::search::SimilarityIndex;
use crate::types::{Metric, VectorId};

/// Directed, weighted edge between two distinct vectors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: VectorId,
    pub target: VectorId,
    pub weight: f32,
}

/// Convert a raw index score into an edge weight.
#[inline]
pub fn edge_weight(metric: Metric, score: f32) -> f32 {
    match metric {
        Metric::Cosine => score,
        Metric::Euclidean => 1.0 / (1.0 + score),
    }
}

/// Flat edge-list form of a graph plus summary counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub k: usize,
    pub num_nodes: usize,
    pub num_edges: usize,
    pub edges: Vec<GraphEdge>,
}

/// Fixed out-degree graph keyed by source identifier, in index order.
#[derive(Debug, Clone, PartialEq)]
pub struct KnnGraph {
    k: usize,
    metric: Metric,
    nodes: Vec<(VectorId, Vec<GraphEdge>)>,
    lookup: HashMap<VectorId, usize>,
}

impl KnnGraph {
    fn new(k: usize, metric: Metric, nodes: Vec<(VectorId, Vec<GraphEdge>)>) -> Self {
        let lookup = nodes
            .iter()
            .enumerate()
            .map(|(pos, (id, _))| (*id, pos))
            .collect();
        Self {
            k,
            metric,
            nodes,
            lookup,
        }
    }

    /// Configured out-degree
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|(_, edges)| edges.len()).sum()
    }

    pub fn contains(&self, id: &VectorId) -> bool {
        self.lookup.contains_key(id)
    }

    /// Outgoing edges of `id`, best first
    pub fn neighbors(&self, id: &VectorId) -> Option<&[GraphEdge]> {
        self.lookup.get(id).map(|&pos| self.nodes[pos].1.as_slice())
    }

    /// `(source, edges)` pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (&VectorId, &[GraphEdge])> {
        self.nodes.iter().map(|(id, edges)| (id, edges.as_slice()))
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.nodes.iter().flat_map(|(_, edges)| edges.iter())
    }

    /// Drop every node and edge that mentions an identifier rejected by
    /// `keep`. Returns the number of nodes removed.
    pub fn retain_nodes<F>(&mut self, keep: F) -> usize
    where
        F: Fn(&VectorId) -> bool,
    {
        let before = self.nodes.len();
        self.nodes.retain(|(id, _)| keep(id));
        for (_, edges) in &mut self.nodes {
            edges.retain(|edge| keep(&edge.target));
        }
        let removed = before - self.nodes.len();
        if removed > 0 {
            *self = Self::new(self.k, self.metric, std::mem::take(&mut self.nodes));
        }
        removed
    }

    pub fn to_document(&self) -> GraphDocument {
        let edges: Vec<GraphEdge> = self.edges().copied().collect();
        GraphDocument {
            k: self.k,
            num_nodes: self.node_count(),
            num_edges: edges.len(),
            edges,
        }
    }
}

/// Builds k-NN graphs over a [`SimilarityIndex`].
pub struct GraphBuilder<'a> {
    index: &'a SimilarityIndex,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(index: &'a SimilarityIndex) -> Self {
        Self { index }
    }

    /// Build the graph with out-degree `k`.
    ///
    /// Fails with `InsufficientData` when the index holds fewer than two
    /// vectors. Nodes get exactly `k` edges when at least `k + 1` vectors
    /// exist, otherwise every other vector.
    pub fn build(&self, k: usize) -> Result<KnnGraph> {
        let count = self.index.len();
        if count < 2 {
            return Err(AtlasError::InsufficientData {
                required: 2,
                available: count,
            });
        }

        let metric = self.index.metric();
        let ids = self.index.identifiers();
        debug!(nodes = count, k, %metric, "building k-NN graph");

        let nodes: Vec<(VectorId, Vec<GraphEdge>)> = (0..count)
            .into_par_iter()
            .map(|position| {
                let source = ids[position];
                // Rows are stored prepared, so they can be used as queries as-is
                let row = self.index.get(position).unwrap_or_default();
                let edges: Vec<GraphEdge> = self
                    .index
                    .nearest_positions(row, k.saturating_add(1))
                    .into_iter()
                    .filter(|&(target_pos, _)| ids[target_pos] != source)
                    .take(k)
                    .map(|(target_pos, score)| GraphEdge {
                        source,
                        target: ids[target_pos],
                        weight: edge_weight(metric, score),
                    })
                    .collect();
                (source, edges)
            })
            .collect();

        let graph = KnnGraph::new(k, metric, nodes);
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            k,
            "k-NN graph built"
        );
        Ok(graph)
    }
}
