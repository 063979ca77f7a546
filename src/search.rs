//! Exact k-NN search over a dense in-memory matrix
//!
//! Every query is compared against every stored row (no approximation).
//! Scoring is parallelized across rows with rayon; top-k selection uses a
//! bounded heap and breaks score ties by ascending insertion position so
//! results are reproducible.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::{AtlasError, Result};
use crate::types::{Metric, SearchResult, VectorId};

/// Compute dot product of two f32 vectors
#[inline]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute L2 norm (magnitude) of a vector
#[inline]
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Scale `v` to unit length in place. Zero and non-finite vectors are left
/// untouched.
#[inline]
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 && norm.is_finite() {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Candidate row during top-k selection. Greater means better.
#[derive(Debug, Clone, Copy)]
struct SearchCandidate {
    position: usize,
    score: f32,
    key: f32,
}

impl SearchCandidate {
    fn new(position: usize, score: f32, metric: Metric) -> Self {
        let key = if score.is_nan() {
            f32::NEG_INFINITY
        } else if metric.higher_is_better() {
            score
        } else {
            -score
        };
        Self { position, score, key }
    }
}

impl PartialEq for SearchCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchCandidate {}

impl PartialOrd for SearchCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earlier rows win ties
        self.key
            .total_cmp(&other.key)
            .then_with(|| other.position.cmp(&self.position))
    }
}

/// Keep the best `k` candidates, returned best-first.
fn select_top_k<I>(candidates: I, k: usize) -> Vec<SearchCandidate>
where
    I: IntoIterator<Item = SearchCandidate>,
{
    if k == 0 {
        return Vec::new();
    }

    // Min-heap on quality: the worst kept candidate sits on top
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for candidate in candidates {
        heap.push(Reverse(candidate));
        if heap.len() > k {
            heap.pop();
        }
    }

    let mut results: Vec<_> = heap.into_iter().map(|Reverse(c)| c).collect();
    results.sort_unstable_by(|a, b| b.cmp(a));
    results
}

/// Size and footprint of the index
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimension: usize,
    pub metric: Metric,
    pub memory_bytes: usize,
}

/// Append-only exact similarity index.
///
/// Rows live in one row-major buffer; `ids[i]` names row `i`. Positions match
/// the owning store's insertion order.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    dimension: usize,
    metric: Metric,
    data: Vec<f32>,
    ids: Vec<VectorId>,
}

impl SimilarityIndex {
    /// Create an empty index. Rows must have at least one component.
    pub fn new(dimension: usize, metric: Metric) -> Result<Self> {
        if dimension == 0 {
            return Err(AtlasError::InvalidConfig(
                "index dimension must be greater than zero".into(),
            ));
        }
        Ok(Self {
            dimension,
            metric,
            data: Vec::new(),
            ids: Vec::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifiers in row order
    pub fn identifiers(&self) -> &[VectorId] {
        &self.ids
    }

    /// Stored (possibly normalized) row at `position`
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        if position >= self.ids.len() {
            return None;
        }
        let offset = position * self.dimension;
        Some(&self.data[offset..offset + self.dimension])
    }

    fn check_dimension(&self, v: &[f32]) -> Result<()> {
        if v.len() != self.dimension {
            return Err(AtlasError::DimensionMismatch {
                expected: self.dimension,
                actual: v.len(),
            });
        }
        Ok(())
    }

    /// Append a batch of rows.
    ///
    /// The whole batch is validated before anything is written, so a failed
    /// call leaves the index unchanged.
    pub fn add<V: AsRef<[f32]>>(&mut self, embeddings: &[V], ids: &[VectorId]) -> Result<()> {
        if embeddings.len() != ids.len() {
            return Err(AtlasError::LengthMismatch {
                left: embeddings.len(),
                right: ids.len(),
            });
        }
        for row in embeddings {
            self.check_dimension(row.as_ref())?;
        }

        self.data.reserve(embeddings.len() * self.dimension);
        for (row, id) in embeddings.iter().zip(ids) {
            let start = self.data.len();
            self.data.extend_from_slice(row.as_ref());
            if self.metric == Metric::Cosine {
                l2_normalize(&mut self.data[start..]);
            }
            self.ids.push(*id);
        }
        Ok(())
    }

    /// Prepare a query for comparison against stored rows.
    fn prepare_query(&self, query: &[f32]) -> Vec<f32> {
        let mut q = query.to_vec();
        if self.metric == Metric::Cosine {
            l2_normalize(&mut q);
        }
        q
    }

    #[inline]
    fn score(&self, query: &[f32], row: &[f32]) -> f32 {
        match self.metric {
            Metric::Cosine => dot_product(query, row),
            Metric::Euclidean => squared_l2(query, row),
        }
    }

    /// Best `k` rows for an already-prepared query, as `(position, score)`.
    pub(crate) fn nearest_positions(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let count = self.len();
        if count == 0 {
            return Vec::new();
        }
        let actual_k = k.min(count);

        let scores: Vec<f32> = self
            .data
            .par_chunks_exact(self.dimension)
            .map(|row| self.score(query, row))
            .collect();

        let metric = self.metric;
        select_top_k(
            scores
                .into_iter()
                .enumerate()
                .map(|(position, score)| SearchCandidate::new(position, score, metric)),
            actual_k,
        )
        .into_iter()
        .map(|c| (c.position, c.score))
        .collect()
    }

    /// Perform exact k-NN search.
    ///
    /// Results are sorted best-first for the active metric: descending
    /// similarity for cosine, ascending squared distance for euclidean.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.check_dimension(query)?;
        Ok(self.search_unchecked(query, k))
    }

    fn search_unchecked(&self, query: &[f32], k: usize) -> Vec<SearchResult> {
        if self.is_empty() {
            return Vec::new();
        }
        let q = self.prepare_query(query);
        self.nearest_positions(&q, k)
            .into_iter()
            .map(|(position, score)| SearchResult::new(self.ids[position], score))
            .collect()
    }

    /// Search several queries, one result list per query in input order.
    pub fn search_batch<V>(&self, queries: &[V], k: usize) -> Result<Vec<Vec<SearchResult>>>
    where
        V: AsRef<[f32]> + Sync,
    {
        for query in queries {
            self.check_dimension(query.as_ref())?;
        }

        Ok(queries
            .par_iter()
            .map(|query| self.search_unchecked(query.as_ref(), k))
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            vector_count: self.len(),
            dimension: self.dimension,
            metric: self.metric,
            memory_bytes: self.data.len() * std::mem::size_of::<f32>()
                + self.ids.len() * std::mem::size_of::<VectorId>(),
        }
    }
}
