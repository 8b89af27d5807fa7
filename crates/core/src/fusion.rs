//! Hybrid fusion over the BM25 index and the vector store.
//!
//! A [`FusionRetriever`] owns both memory-tier indexes and combines their
//! ranked lists with a selectable strategy: BM25 only, vector only, or a
//! fused ranking (weighted min-max combination or Reciprocal Rank Fusion).
//! Hybrid queries run both legs concurrently and fuse the full candidate
//! sets before truncation, so the top-k output does not depend on the
//! legs' completion order.

use crate::bm25::Bm25Index;
use crate::chunk::{Chunk, RetrievalResult};
use crate::config::{Bm25Config, FusionConfig, FusionStrategy};
use crate::embed::{EmbeddingKind, EmbeddingProvider};
use crate::tokenizer::Tokenizer;
use crate::vector::{VectorMeta, VectorStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Hook for a second-stage reranker over fused results.
///
/// No implementation ships; `enable_rerank` only wires a caller-supplied
/// reranker in when one is attached.
pub trait Reranker: Send + Sync {
    fn rerank(&self, query: &str, results: Vec<RetrievalResult>) -> Vec<RetrievalResult>;
}

/// Memory-tier retriever fusing lexical and dense rankings.
pub struct FusionRetriever {
    config: FusionConfig,
    bm25: Bm25Index,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    /// Fitted chunk list, in index order. The write guard is held across
    /// both index rebuilds so queries observe pre- or post-fit state,
    /// never a mix.
    chunks: RwLock<Vec<Chunk>>,
    /// `(doc_id, seq_no)` key → vector id assigned at fit time.
    doc_to_vector: RwLock<HashMap<String, u64>>,
}

impl FusionRetriever {
    pub fn new(
        config: FusionConfig,
        bm25_config: &Bm25Config,
        tokenizer: Tokenizer,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            bm25: Bm25Index::new(bm25_config, tokenizer),
            vectors,
            embedder,
            reranker: None,
            chunks: RwLock::new(Vec::new()),
            doc_to_vector: RwLock::new(HashMap::new()),
        }
    }

    /// Attaches a caller-supplied reranker, applied to fused rankings when
    /// `enable_rerank` is set.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Rebuilds both indexes from the chunk list.
    ///
    /// Stores the chunks verbatim, refits BM25, resets the vector store,
    /// and inserts one document embedding per chunk. A chunk whose
    /// embedding has the wrong dimension keeps its BM25 entry; the vector
    /// insert is skipped with a warning.
    pub fn fit(&self, new_chunks: &[Chunk]) {
        let mut chunks = self.chunks.write();
        let mut mapping = self.doc_to_vector.write();

        self.bm25.fit(new_chunks);
        self.vectors.reset();
        mapping.clear();
        for (i, chunk) in new_chunks.iter().enumerate() {
            let embedding = self.embedder.embed(&chunk.text, EmbeddingKind::Document);
            let meta = VectorMeta {
                doc_id: chunk.doc_id.clone(),
                seq_no: chunk.seq_no,
                content: chunk.text.clone(),
            };
            match self.vectors.insert(&embedding, i as u64, meta) {
                Ok(()) => {
                    mapping.insert(chunk.key(), i as u64);
                }
                Err(e) => {
                    tracing::warn!(chunk = %chunk.key(), "skipping vector insert: {e}");
                }
            }
        }
        *chunks = new_chunks.to_vec();
    }

    /// Number of fitted chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count() == 0
    }

    /// Documents currently in the BM25 index.
    pub fn bm25_doc_count(&self) -> usize {
        self.bm25.doc_count()
    }

    /// Distinct terms in the BM25 vocabulary.
    pub fn bm25_vocabulary_size(&self) -> usize {
        self.bm25.vocabulary_size()
    }

    /// Retrieves the top `top_k` results for `query_text`.
    ///
    /// Single-leg strategies run inline. Hybrid strategies run both legs
    /// concurrently, each capped at `max_candidates`, await both, and
    /// fuse; the caller blocks until both sub-retrievals complete.
    pub fn query(&self, query_text: &str, top_k: usize) -> Vec<RetrievalResult> {
        if query_text.trim().is_empty() || top_k == 0 {
            return Vec::new();
        }

        match self.config.strategy {
            FusionStrategy::Bm25Only => self.bm25_retrieve(query_text, top_k),
            FusionStrategy::VectorOnly => self.vector_retrieve(query_text, top_k),
            FusionStrategy::Hybrid | FusionStrategy::Rrf | FusionStrategy::Weighted => {
                let candidates = self.config.max_candidates;
                let (bm25_results, vector_results) = rayon::join(
                    || self.bm25_retrieve(query_text, candidates),
                    || self.vector_retrieve(query_text, candidates),
                );

                let fused = match self.config.strategy {
                    FusionStrategy::Rrf => rrf_fusion(
                        &bm25_results,
                        &vector_results,
                        self.config.bm25_weight,
                        self.config.vector_weight,
                        self.config.rrf_k,
                        top_k,
                    ),
                    // HYBRID defaults to the weighted combination.
                    _ => weighted_fusion(
                        &bm25_results,
                        &vector_results,
                        self.config.bm25_weight,
                        self.config.vector_weight,
                        top_k,
                    ),
                };

                match (&self.reranker, self.config.enable_rerank) {
                    (Some(reranker), true) => reranker.rerank(query_text, fused),
                    _ => fused,
                }
            }
        }
    }

    fn bm25_retrieve(&self, query_text: &str, top_k: usize) -> Vec<RetrievalResult> {
        let chunks = self.chunks.read();
        self.bm25
            .query_text(query_text, top_k)
            .into_iter()
            .filter_map(|(idx, score)| {
                chunks
                    .get(idx)
                    .map(|c| RetrievalResult::new(&c.doc_id, c.seq_no, score, &c.text))
            })
            .collect()
    }

    fn vector_retrieve(&self, query_text: &str, top_k: usize) -> Vec<RetrievalResult> {
        let _chunks = self.chunks.read();
        let query_vec = self.embedder.embed(query_text, EmbeddingKind::Query);
        self.vectors
            .search(&query_vec, top_k)
            .into_iter()
            .map(|hit| {
                RetrievalResult::new(
                    &hit.meta.doc_id,
                    hit.meta.seq_no,
                    hit.similarity,
                    &hit.meta.content,
                )
            })
            .collect()
    }
}

/// Min-max normalizes scores into `[0, 1]` in place. A degenerate range
/// maps every score to 1.0.
fn normalize_scores(results: &mut [RetrievalResult]) {
    let Some(first) = results.first() else {
        return;
    };
    let mut min = first.score;
    let mut max = first.score;
    for r in results.iter() {
        min = min.min(r.score);
        max = max.max(r.score);
    }
    let range = max - min;
    for r in results.iter_mut() {
        r.score = if range < f32::EPSILON {
            1.0
        } else {
            (r.score - min) / range
        };
    }
}

/// Sorts fused entries by descending score, breaking ties by lexicographic
/// `(doc_id, seq_no)`, and truncates to `top_k`.
fn rank_and_truncate(
    scores: HashMap<String, f32>,
    mut originals: HashMap<String, RetrievalResult>,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let mut fused: Vec<RetrievalResult> = scores
        .into_iter()
        .filter_map(|(key, score)| {
            originals.remove(&key).map(|mut r| {
                r.score = score;
                r
            })
        })
        .collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| (&a.doc_id, a.seq_no).cmp(&(&b.doc_id, b.seq_no)))
    });
    fused.truncate(top_k);
    fused
}

/// Weighted fusion: each list is min-max normalized independently, then
/// `combined = bm25_weight · bm25_norm + vector_weight · vector_norm`,
/// with a missing term contributing 0.
pub fn weighted_fusion(
    bm25_results: &[RetrievalResult],
    vector_results: &[RetrievalResult],
    bm25_weight: f32,
    vector_weight: f32,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let mut norm_bm25 = bm25_results.to_vec();
    let mut norm_vector = vector_results.to_vec();
    normalize_scores(&mut norm_bm25);
    normalize_scores(&mut norm_vector);

    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut originals: HashMap<String, RetrievalResult> = HashMap::new();

    for result in norm_bm25 {
        let key = result.key();
        *scores.entry(key.clone()).or_insert(0.0) += bm25_weight * result.score;
        originals.entry(key).or_insert(result);
    }
    for result in norm_vector {
        let key = result.key();
        *scores.entry(key.clone()).or_insert(0.0) += vector_weight * result.score;
        originals.entry(key).or_insert(result);
    }

    rank_and_truncate(scores, originals, top_k)
}

/// Reciprocal Rank Fusion:
/// `combined(d) = bm25_weight / (k + rank_bm25 + 1) + vector_weight / (k + rank_vec + 1)`,
/// rank numbering starting at 0; absence from a list contributes 0.
pub fn rrf_fusion(
    bm25_results: &[RetrievalResult],
    vector_results: &[RetrievalResult],
    bm25_weight: f32,
    vector_weight: f32,
    rrf_k: f32,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut originals: HashMap<String, RetrievalResult> = HashMap::new();

    for (rank, result) in bm25_results.iter().enumerate() {
        let key = result.key();
        *scores.entry(key.clone()).or_insert(0.0) += bm25_weight / (rrf_k + rank as f32 + 1.0);
        originals.entry(key).or_insert_with(|| result.clone());
    }
    for (rank, result) in vector_results.iter().enumerate() {
        let key = result.key();
        *scores.entry(key.clone()).or_insert(0.0) += vector_weight / (rrf_k + rank as f32 + 1.0);
        originals.entry(key).or_insert_with(|| result.clone());
    }

    rank_and_truncate(scores, originals, top_k)
}
