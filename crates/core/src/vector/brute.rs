//! Brute-force reference vector store.

use super::{cosine_similarity, VectorHit, VectorMeta, VectorStore};
use crate::error::{RagError, Result};
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

struct Entry {
    vector: Vec<f32>,
    id: u64,
    meta: VectorMeta,
}

/// Exhaustive-scan vector store.
///
/// Searches iterate every stored vector, which is exact and fast enough
/// for memory-tier corpora. Reads take a shared lock and may run in
/// parallel; reset and insert take the write lock.
pub struct BruteForceStore {
    dimension: usize,
    entries: RwLock<Vec<Entry>>,
}

impl BruteForceStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl VectorStore for BruteForceStore {
    fn reset(&self) {
        self.entries.write().clear();
    }

    fn insert(&self, vector: &[f32], id: u64, meta: VectorMeta) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.entries.write().push(Entry {
            vector: vector.to_vec(),
            id,
            meta,
        });
        Ok(())
    }

    fn search(&self, query: &[f32], limit: usize) -> Vec<VectorHit> {
        if limit == 0 {
            return Vec::new();
        }
        let entries = self.entries.read();

        // Partial sort: O(n log k) via min-heap of size k.
        let mut heap: BinaryHeap<Reverse<(OrderedFloat<f32>, usize)>> =
            BinaryHeap::with_capacity(limit + 1);
        for (idx, entry) in entries.iter().enumerate() {
            let similarity = cosine_similarity(query, &entry.vector);
            heap.push(Reverse((OrderedFloat(similarity), idx)));
            if heap.len() > limit {
                heap.pop();
            }
        }

        let mut hits: Vec<VectorHit> = heap
            .into_iter()
            .map(|Reverse((sim, idx))| {
                let entry = &entries[idx];
                VectorHit {
                    id: entry.id,
                    similarity: sim.0,
                    meta: entry.meta.clone(),
                }
            })
            .collect();
        hits.sort_unstable_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
