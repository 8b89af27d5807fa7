//! Strategy-driven retrieval over the SQLite store.
//!
//! Wraps [`SqliteStore`] with full-text, vector, hybrid, and adaptive
//! query strategies, an LRU result cache keyed by query fingerprint,
//! parallel hybrid legs, and worker-pool dispatch for whole queries.

use super::store::{SqliteStore, StoreStats, StoredHit};
use crate::cache::RetrievalCache;
use crate::chunk::Chunk;
use crate::config::{FusionStrategy, RagConfig};
use crate::embed::{EmbeddingKind, EmbeddingProvider};
use crate::pool::WorkerPool;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Query strategy for the persistent tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStrategy {
    /// Full-text search only.
    Fts5Only,
    /// Embed the query, then vector search only.
    VectorOnly,
    /// Both legs, normalized and weighted.
    Hybrid,
    /// Pick a strategy per query from string heuristics.
    Adaptive,
}

impl fmt::Display for PersistStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PersistStrategy::Fts5Only => "fts5_only",
            PersistStrategy::VectorOnly => "vector_only",
            PersistStrategy::Hybrid => "hybrid",
            PersistStrategy::Adaptive => "adaptive",
        };
        f.write_str(name)
    }
}

/// Persistent-retriever tuning knobs.
#[derive(Debug, Clone)]
pub struct PersistConfig {
    pub strategy: PersistStrategy,
    pub fts_weight: f32,
    pub vector_weight: f32,
    /// Default result count when the caller passes no limit.
    pub max_results: usize,
    pub enable_cache: bool,
    pub enable_parallel: bool,
    /// Candidate count for the full-text leg of hybrid queries.
    pub fts_limit: usize,
    /// Candidate count for the vector leg of hybrid queries.
    pub vector_limit: usize,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            strategy: PersistStrategy::Hybrid,
            fts_weight: 0.6,
            vector_weight: 0.4,
            max_results: 10,
            enable_cache: true,
            enable_parallel: true,
            fts_limit: 50,
            vector_limit: 50,
        }
    }
}

impl PersistConfig {
    /// Derives the persistent-tier configuration from the top-level record.
    pub fn from_rag_config(config: &RagConfig) -> Self {
        let strategy = match config.fusion.strategy {
            FusionStrategy::Bm25Only => PersistStrategy::Fts5Only,
            FusionStrategy::VectorOnly => PersistStrategy::VectorOnly,
            FusionStrategy::Hybrid => PersistStrategy::Hybrid,
            FusionStrategy::Rrf | FusionStrategy::Weighted => PersistStrategy::Adaptive,
        };
        Self {
            strategy,
            fts_weight: config.fusion.bm25_weight,
            vector_weight: config.fusion.vector_weight,
            fts_limit: config.sqlite.fts5_limit,
            vector_limit: config.sqlite.vector_limit,
            ..Self::default()
        }
    }
}

/// Durable retriever with caching and parallel hybrid dispatch.
pub struct PersistentRetriever {
    config: PersistConfig,
    store: Option<Arc<SqliteStore>>,
    cache: Option<RetrievalCache>,
    pool: Option<Arc<WorkerPool>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl PersistentRetriever {
    /// Opens the backing store and wires the cache and worker pool.
    ///
    /// A store that fails to open is logged; the retriever stays
    /// constructible, [`initialize`] reports `false`, and every operation
    /// returns empty results.
    ///
    /// [`initialize`]: PersistentRetriever::initialize
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        pool: Option<Arc<WorkerPool>>,
    ) -> Self {
        let store = match SqliteStore::open(config.sqlite.clone()) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::error!("failed to open persistent store: {e}");
                None
            }
        };
        let retriever_config = PersistConfig::from_rag_config(config);
        let cache = retriever_config
            .enable_cache
            .then(|| RetrievalCache::new(&config.cache));
        Self {
            config: retriever_config,
            store,
            cache,
            pool,
            embedder,
        }
    }

    /// Reports whether the backing store is usable.
    pub fn initialize(&self) -> bool {
        self.store.is_some()
    }

    /// Replaces the retrieval configuration.
    pub fn update_config(&mut self, config: PersistConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Writes chunks to the store. Returns the number of successful
    /// inserts; the result cache is invalidated.
    pub fn insert_documents(&self, chunks: &[Chunk]) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };
        let embedder = Arc::clone(&self.embedder);
        let inserted = store
            .insert_chunks(chunks, |text| {
                embedder.embed(text, EmbeddingKind::Document)
            })
            .unwrap_or_else(|e| {
                tracing::error!("ingest failed: {e}");
                0
            });
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        inserted
    }

    /// Retrieves up to `limit` chunks for `query`.
    ///
    /// Resolves the adaptive strategy, consults the cache, executes the
    /// chosen legs, and caches the resulting chunk ids.
    pub fn query(&self, query: &str, limit: usize) -> Vec<StoredHit> {
        if self.store.is_none() || query.is_empty() {
            return Vec::new();
        }
        let limit = if limit == 0 {
            self.config.max_results
        } else {
            limit
        };

        let strategy = match self.config.strategy {
            PersistStrategy::Adaptive => choose_strategy(query),
            fixed => fixed,
        };
        let fingerprint = format!("q:{query}|s:{strategy}|l:{limit}");

        if let Some(cache) = &self.cache {
            if let Some(chunk_ids) = cache.get(&fingerprint) {
                let results = self.get_documents_by_ids(&chunk_ids);
                if !results.is_empty() {
                    tracing::debug!(query, "cache hit");
                    return results;
                }
            }
        }

        let results = match strategy {
            PersistStrategy::Fts5Only => self.query_text_only(query, limit),
            PersistStrategy::VectorOnly => self.query_vector_only(query, limit),
            _ => self.query_hybrid(query, limit),
        };

        if let Some(cache) = &self.cache {
            cache.put(
                fingerprint,
                results.iter().map(|hit| hit.chunk_id).collect(),
            );
        }
        results
    }

    /// Full-text leg only.
    pub fn query_text_only(&self, query: &str, limit: usize) -> Vec<StoredHit> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        store.search_fulltext(query, limit).unwrap_or_else(|e| {
            tracing::warn!("fulltext search failed: {e}");
            Vec::new()
        })
    }

    /// Vector leg only.
    pub fn query_vector_only(&self, query: &str, limit: usize) -> Vec<StoredHit> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        let embedding = self.embedder.embed(query, EmbeddingKind::Query);
        if embedding.is_empty() {
            tracing::warn!("empty query embedding; skipping vector search");
            return Vec::new();
        }
        store.search_vector(&embedding, limit).unwrap_or_else(|e| {
            tracing::warn!("vector search failed: {e}");
            Vec::new()
        })
    }

    /// Both legs at their configured candidate limits, merged.
    ///
    /// Full-text scores are normalized via `1 / (1 + |score|)`; documents
    /// present in both lists have their weighted components summed. The
    /// caller blocks until both legs complete.
    pub fn query_hybrid(&self, query: &str, limit: usize) -> Vec<StoredHit> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        let embedding = self.embedder.embed(query, EmbeddingKind::Query);
        let fts_limit = limit.max(self.config.fts_limit);
        let vector_limit = limit.max(self.config.vector_limit);

        let (fts_results, vector_results) = if self.config.enable_parallel {
            rayon::join(
                || store.search_fulltext(query, fts_limit),
                || store.search_vector(&embedding, vector_limit),
            )
        } else {
            (
                store.search_fulltext(query, fts_limit),
                store.search_vector(&embedding, vector_limit),
            )
        };

        merge_hybrid(
            drain_leg(fts_results),
            drain_leg(vector_results),
            self.config.fts_weight,
            self.config.vector_weight,
            limit,
        )
    }

    /// Submits a whole query to the worker pool, returning a handle to the
    /// eventual result. Without a pool the query runs synchronously and
    /// the handle resolves immediately.
    pub fn query_async(
        self: Arc<Self>,
        query: &str,
        limit: usize,
    ) -> crate::pool::TaskHandle<Vec<StoredHit>> {
        match self.pool.clone() {
            Some(pool) => {
                let query = query.to_string();
                pool.submit(move || self.query(&query, limit))
            }
            None => crate::pool::TaskHandle::ready(self.query(query, limit)),
        }
    }

    /// Fetches chunks by backend row id, preserving the input order.
    pub fn get_documents_by_ids(&self, chunk_ids: &[i64]) -> Vec<StoredHit> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        store.get_chunks_by_ids(chunk_ids).unwrap_or_else(|e| {
            tracing::warn!("id lookup failed: {e}");
            Vec::new()
        })
    }

    /// Fetches every chunk of a document, in sequence order.
    pub fn get_documents_by_doc_id(&self, doc_id: &str) -> Vec<StoredHit> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        store.get_chunks_by_doc_id(doc_id).unwrap_or_else(|e| {
            tracing::warn!("doc lookup failed: {e}");
            Vec::new()
        })
    }

    /// Removes all stored data; the result cache is invalidated.
    pub fn clear_all_data(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let cleared = match store.clear_all() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("clear failed: {e}");
                false
            }
        };
        if let Some(cache) = &self.cache {
            cache.clear();
        }
        cleared
    }

    /// Backend statistics; zeros when the store is unavailable.
    pub fn get_stats(&self) -> StoreStats {
        let Some(store) = &self.store else {
            return StoreStats::default();
        };
        store.stats().unwrap_or_else(|e| {
            tracing::warn!("stats failed: {e}");
            StoreStats::default()
        })
    }

    /// Primes the cache and the SQLite page cache with sample queries.
    pub fn warmup(&self, sample_queries: &[String]) {
        let defaults = [
            "machine learning",
            "artificial intelligence",
            "deep learning",
            "natural language processing",
        ];
        let queries: Vec<String> = if sample_queries.is_empty() {
            defaults.iter().map(|q| q.to_string()).collect()
        } else {
            sample_queries.to_vec()
        };
        tracing::info!(count = queries.len(), "warmup starting");
        for query in &queries {
            let _ = self.query(query, 5);
        }
    }
}

fn drain_leg(result: crate::error::Result<Vec<StoredHit>>) -> Vec<StoredHit> {
    result.unwrap_or_else(|e| {
        tracing::warn!("retrieval leg failed: {e}");
        Vec::new()
    })
}

/// Heuristic strategy choice: short keyword-dense queries go to full-text,
/// long queries go to vector search, everything else runs hybrid.
fn choose_strategy(query: &str) -> PersistStrategy {
    let english_words = query
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .count();
    if query.len() < 50 && english_words > 2 {
        PersistStrategy::Fts5Only
    } else if query.len() > 100 {
        PersistStrategy::VectorOnly
    } else {
        PersistStrategy::Hybrid
    }
}

/// Weighted merge of the two candidate lists.
fn merge_hybrid(
    fts_results: Vec<StoredHit>,
    vector_results: Vec<StoredHit>,
    fts_weight: f32,
    vector_weight: f32,
    limit: usize,
) -> Vec<StoredHit> {
    let mut merged: Vec<StoredHit> = Vec::new();
    let mut index_of: HashMap<i64, usize> = HashMap::new();

    for mut hit in fts_results {
        hit.score = fts_weight / (1.0 + hit.score.abs());
        index_of.insert(hit.chunk_id, merged.len());
        merged.push(hit);
    }
    for mut hit in vector_results {
        let weighted = hit.score * vector_weight;
        match index_of.get(&hit.chunk_id) {
            Some(&idx) => merged[idx].score += weighted,
            None => {
                hit.score = weighted;
                index_of.insert(hit.chunk_id, merged.len());
                merged.push(hit);
            }
        }
    }

    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::embed::HashEmbedding;
    use tempfile::TempDir;

    fn retriever_in(dir: &TempDir) -> PersistentRetriever {
        let mut config = RagConfig::default();
        config.sqlite.db_path = dir
            .path()
            .join("retriever.db")
            .to_string_lossy()
            .into_owned();
        config.sqlite.vector_dimension = 16;
        config.hnsw.vector_dim = 16;
        PersistentRetriever::new(
            &config,
            Arc::new(HashEmbedding::new(16)),
            Some(Arc::new(WorkerPool::new(2))),
        )
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            Chunk::new("ml", 0, "machine learning algorithms learn from data"),
            Chunk::new("dl", 0, "deep learning trains neural networks"),
            Chunk::new("db", 0, "databases store structured records"),
        ]
    }

    #[test]
    fn test_choose_strategy_heuristics() {
        // One word, short: hybrid (word count <= 2).
        assert_eq!(choose_strategy("neural"), PersistStrategy::Hybrid);
        // Three words under 50 chars: full-text.
        assert_eq!(
            choose_strategy("machine learning algorithms"),
            PersistStrategy::Fts5Only
        );
        // Over 100 chars: vector.
        let long = "a".repeat(120);
        assert_eq!(choose_strategy(&long), PersistStrategy::VectorOnly);
    }

    #[test]
    fn test_initialize_and_insert() {
        let dir = TempDir::new().unwrap();
        let r = retriever_in(&dir);
        assert!(r.initialize());
        assert_eq!(r.insert_documents(&corpus()), 3);
        assert_eq!(r.get_stats().total_chunks, 3);
    }

    #[test]
    fn test_text_only_query() {
        let dir = TempDir::new().unwrap();
        let r = retriever_in(&dir);
        r.insert_documents(&corpus());
        let hits = r.query_text_only("learning", 10);
        assert_eq!(hits.len(), 2);
        for hit in &hits {
            assert!(hit.content.contains("learning"));
        }
    }

    #[test]
    fn test_hybrid_query_respects_limit_and_dedupes() {
        let dir = TempDir::new().unwrap();
        let r = retriever_in(&dir);
        r.insert_documents(&corpus());
        let hits = r.query_hybrid("learning data", 2);
        assert!(hits.len() <= 2);
        let mut ids: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), hits.len());
    }

    #[test]
    fn test_hybrid_sorted_descending() {
        let dir = TempDir::new().unwrap();
        let r = retriever_in(&dir);
        r.insert_documents(&corpus());
        let hits = r.query_hybrid("machine learning", 10);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_cache_hit_equivalent_results() {
        let dir = TempDir::new().unwrap();
        let r = retriever_in(&dir);
        r.insert_documents(&corpus());

        let first = r.query("machine learning algorithms", 5);
        let second = r.query("machine learning algorithms", 5);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.chunk_id, b.chunk_id);
            assert_eq!(a.content, b.content);
        }
    }

    #[test]
    fn test_ingest_invalidates_cache() {
        let dir = TempDir::new().unwrap();
        let r = retriever_in(&dir);
        r.insert_documents(&corpus());
        let before = r.query("learning", 10);
        r.insert_documents(&[Chunk::new("new", 0, "more learning material")]);
        let after = r.query("learning", 10);
        assert!(after.len() > before.len());
    }

    #[test]
    fn test_empty_query_returns_empty() {
        let dir = TempDir::new().unwrap();
        let r = retriever_in(&dir);
        r.insert_documents(&corpus());
        assert!(r.query("", 10).is_empty());
    }

    #[test]
    fn test_clear_all_data() {
        let dir = TempDir::new().unwrap();
        let r = retriever_in(&dir);
        r.insert_documents(&corpus());
        assert!(r.clear_all_data());
        assert!(r.query("learning", 10).is_empty());
        assert_eq!(r.get_stats().total_chunks, 0);
    }

    #[test]
    fn test_roundtrip_by_ids() {
        let dir = TempDir::new().unwrap();
        let r = retriever_in(&dir);
        r.insert_documents(&corpus());
        let hits = r.query_text_only("databases", 1);
        assert_eq!(hits.len(), 1);
        let fetched = r.get_documents_by_ids(&[hits[0].chunk_id]);
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].content, hits[0].content);
        assert_eq!(fetched[0].topic, hits[0].topic);
    }

    #[test]
    fn test_query_async_matches_sync() {
        let dir = TempDir::new().unwrap();
        let r = Arc::new(retriever_in(&dir));
        r.insert_documents(&corpus());
        let sync = r.query("machine learning algorithms", 5);
        let from_pool = Arc::clone(&r)
            .query_async("machine learning algorithms", 5)
            .wait()
            .unwrap();
        assert_eq!(sync.len(), from_pool.len());
        for (a, b) in sync.iter().zip(from_pool.iter()) {
            assert_eq!(a.chunk_id, b.chunk_id);
        }
    }

    #[test]
    fn test_unavailable_backend_returns_empty() {
        let mut config = RagConfig::default();
        // A directory path cannot be opened as a database file.
        config.sqlite.db_path = "/".to_string();
        let r = PersistentRetriever::new(&config, Arc::new(HashEmbedding::new(16)), None);
        assert!(!r.initialize());
        assert!(r.query("anything", 5).is_empty());
        assert_eq!(r.insert_documents(&corpus()), 0);
        assert!(!r.clear_all_data());
        assert_eq!(r.get_stats().total_chunks, 0);
    }

    #[test]
    fn test_from_rag_config_mapping() {
        let mut config = RagConfig::default();
        config.fusion.strategy = FusionStrategy::Bm25Only;
        assert_eq!(
            PersistConfig::from_rag_config(&config).strategy,
            PersistStrategy::Fts5Only
        );
        config.fusion.strategy = FusionStrategy::Rrf;
        assert_eq!(
            PersistConfig::from_rag_config(&config).strategy,
            PersistStrategy::Adaptive
        );
    }
}
