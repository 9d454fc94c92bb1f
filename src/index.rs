//! In-memory vector index for top-k cosine similarity queries.
//!
//! Exact brute-force scoring, not an approximate structure: every query
//! scans the full collection and returns the true top-k by cosine
//! similarity. At the scales this pipeline targets (thousands to tens of
//! thousands of items per collection) a scan per query stays well inside
//! the latency budget, and exactness keeps scores reproducible.
//!
//! The index is derived state: it is rebuilt from cached embeddings at the
//! start of each run and never persisted.

use crate::embedding::cosine_similarity;

/// Embedding set for one collection, queryable by cosine similarity.
pub struct VectorIndex<K> {
    entries: Vec<(K, Vec<f32>)>,
}

impl<K: Clone> VectorIndex<K> {
    /// Build an index from `(item id, vector)` pairs.
    pub fn build(entries: Vec<(K, Vec<f32>)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` entries ordered by descending cosine similarity to
    /// `vector`.
    ///
    /// Ordering among equal-score entries is unspecified.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<(K, f32)> {
        let mut scored: Vec<(K, f32)> = self
            .entries
            .iter()
            .map(|(id, v)| (id.clone(), cosine_similarity(vector, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}
