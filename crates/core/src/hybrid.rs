//! Two-tier retrieval: an in-memory fusion tier over a persistent tier.
//!
//! All documents live in the persistent store; a bounded subset is served
//! from memory. Searches fan out to both tiers in parallel, merge
//! memory-first with deduplication by `doc_id`, and record per-document
//! access counts. Documents whose access count reaches the hot threshold
//! are promoted into the memory tier by an asynchronous pass that refits
//! the memory index with the combined chunk set.

use crate::chunk::Chunk;
use crate::config::RagConfig;
use crate::embed::{EmbeddingProvider, HashEmbedding};
use crate::error::Result;
use crate::fusion::FusionRetriever;
use crate::pool::WorkerPool;
use crate::sqlite::{PersistentRetriever, StoreStats};
use crate::tokenizer::Tokenizer;
use crate::vector::BruteForceStore;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Which tier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Memory,
    Persistent,
}

/// A merged search result with its originating tier.
#[derive(Debug, Clone)]
pub struct HybridResult {
    pub doc_id: String,
    pub seq_no: u32,
    pub score: f32,
    pub content: String,
    pub topic: String,
    pub source: ResultSource,
}

#[derive(Debug, Clone)]
struct AccessEntry {
    count: u32,
    last_access: Instant,
}

/// Aggregated system statistics for display.
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub store: StoreStats,
    /// Documents currently served from the memory tier.
    pub memory_docs: usize,
    /// Chunks fitted in the memory-tier BM25 index.
    pub memory_chunks: usize,
    /// Distinct terms in the memory-tier BM25 vocabulary.
    pub bm25_vocabulary: usize,
    /// Documents at or above the hot threshold.
    pub hot_docs: usize,
    /// Documents with any recorded access.
    pub tracked_docs: usize,
}

/// State shared with background promotion passes.
struct HybridShared {
    memory: Arc<FusionRetriever>,
    persistent: Arc<PersistentRetriever>,
    access: Mutex<HashMap<String, AccessEntry>>,
    /// doc_ids currently in the memory tier.
    memory_ids: RwLock<HashSet<String>>,
    /// Chunks backing the memory tier, refitted wholesale on promotion.
    memory_chunks: RwLock<Vec<Chunk>>,
    /// Last search latency in milliseconds (f64 bits), for tuner wiring.
    last_latency_ms: AtomicU64,
}

impl HybridShared {
    /// Promotion pass body; see [`HybridSystem::promote_hot`].
    fn promote_hot(&self, hot_threshold: u32, memory_capacity: usize) {
        let mut snapshot: Vec<(String, u32, Instant)> = {
            let access = self.access.lock();
            access
                .iter()
                .map(|(doc_id, entry)| (doc_id.clone(), entry.count, entry.last_access))
                .collect()
        };
        // Most recently accessed first, so remaining capacity goes to the
        // documents still being hit.
        snapshot.sort_by(|a, b| b.2.cmp(&a.2));

        let mut ids = self.memory_ids.write();
        let mut hot_chunks: Vec<Chunk> = Vec::new();
        for (doc_id, count, _) in snapshot {
            if count < hot_threshold || ids.contains(&doc_id) {
                continue;
            }
            if ids.len() + 1 > memory_capacity {
                tracing::warn!("memory tier at capacity; promotion stopped");
                break;
            }
            let stored = self.persistent.get_documents_by_doc_id(&doc_id);
            if stored.is_empty() {
                continue;
            }
            for hit in stored {
                hot_chunks.push(Chunk {
                    doc_id: hit.doc_id,
                    seq_no: hit.seq_no,
                    topic: hit.topic,
                    language: String::new(),
                    text: hit.content,
                    created_at: 0,
                });
            }
            ids.insert(doc_id);
        }

        if !hot_chunks.is_empty() {
            let mut chunks = self.memory_chunks.write();
            let promoted = hot_chunks.len();
            chunks.extend(hot_chunks);
            self.memory.fit(&chunks);
            tracing::info!(promoted, total = chunks.len(), "hot documents promoted");
        }
    }
}

/// Coordinator owning both retrieval tiers.
pub struct HybridSystem {
    shared: Arc<HybridShared>,
    pool: Arc<WorkerPool>,
    hot_threshold: u32,
    memory_capacity: usize,
}

impl std::fmt::Debug for HybridSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridSystem")
            .field("hot_threshold", &self.hot_threshold)
            .field("memory_capacity", &self.memory_capacity)
            .finish_non_exhaustive()
    }
}

impl HybridSystem {
    /// Builds both tiers from the configuration, sharing one worker pool
    /// and one embedding provider. Out-of-range configuration values fail
    /// here with `RagError::Config` before any component is built.
    pub fn new(config: &RagConfig) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(WorkerPool::new(config.threadpool.num_workers));
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(HashEmbedding::new(config.hnsw.vector_dim));
        let vectors = Arc::new(BruteForceStore::new(config.hnsw.vector_dim));

        let memory = Arc::new(FusionRetriever::new(
            config.fusion.clone(),
            &config.bm25,
            Tokenizer::default(),
            vectors,
            Arc::clone(&embedder),
        ));
        let persistent = Arc::new(PersistentRetriever::new(
            config,
            embedder,
            Some(Arc::clone(&pool)),
        ));

        Ok(Self {
            shared: Arc::new(HybridShared {
                memory,
                persistent,
                access: Mutex::new(HashMap::new()),
                memory_ids: RwLock::new(HashSet::new()),
                memory_chunks: RwLock::new(Vec::new()),
                last_latency_ms: AtomicU64::new(0f64.to_bits()),
            }),
            pool,
            hot_threshold: 3,
            memory_capacity: 1000,
        })
    }

    /// Overrides the hot-data access threshold (default 3).
    pub fn with_hot_threshold(mut self, threshold: u32) -> Self {
        self.hot_threshold = threshold;
        self
    }

    /// Overrides the memory-tier capacity in documents (default 1000).
    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity;
        self
    }

    /// Reports whether the persistent tier is usable.
    pub fn initialize(&self) -> bool {
        self.shared.persistent.initialize()
    }

    pub fn persistent(&self) -> &Arc<PersistentRetriever> {
        &self.shared.persistent
    }

    /// Ingests documents: everything goes to the persistent tier, and
    /// while the memory tier is below half its capacity, incoming
    /// documents are admitted up to that mark and the memory index is
    /// rebuilt.
    pub fn load(&self, documents: &[Chunk]) -> usize {
        let inserted = self.shared.persistent.insert_documents(documents);

        let half_capacity = self.memory_capacity / 2;
        let mut ids = self.shared.memory_ids.write();
        if ids.len() < half_capacity {
            let mut chunks = self.shared.memory_chunks.write();
            let mut admitted = 0usize;
            for doc in documents {
                if ids.len() >= half_capacity {
                    break;
                }
                chunks.push(doc.clone());
                ids.insert(doc.doc_id.clone());
                admitted += 1;
            }
            if admitted > 0 {
                self.shared.memory.fit(&chunks);
                tracing::info!(admitted, total = chunks.len(), "memory tier preloaded");
            }
        }
        inserted
    }

    /// The central search operation.
    ///
    /// Dispatches both tiers in parallel and blocks until both complete,
    /// merges memory results first and persistent results for unseen
    /// `doc_id`s until `limit`, records an access per emitted document,
    /// re-sorts by descending score, and schedules an asynchronous
    /// promotion pass on the worker pool.
    pub fn search(&self, query: &str, limit: usize) -> Vec<HybridResult> {
        let started = Instant::now();
        let shared = &self.shared;

        let (memory_results, persistent_results) = rayon::join(
            || {
                if shared.memory.is_empty() {
                    Vec::new()
                } else {
                    shared.memory.query(query, limit)
                }
            },
            || shared.persistent.query(query, limit),
        );

        let mut results: Vec<HybridResult> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for r in memory_results {
            if seen.insert(r.doc_id.clone()) {
                results.push(HybridResult {
                    doc_id: r.doc_id,
                    seq_no: r.seq_no,
                    score: r.score,
                    content: r.text,
                    topic: String::new(),
                    source: ResultSource::Memory,
                });
            }
        }
        for hit in persistent_results {
            if results.len() >= limit {
                break;
            }
            if seen.insert(hit.doc_id.clone()) {
                results.push(HybridResult {
                    doc_id: hit.doc_id,
                    seq_no: hit.seq_no,
                    score: hit.score,
                    content: hit.content,
                    topic: hit.topic,
                    source: ResultSource::Persistent,
                });
            }
        }

        {
            let mut access = shared.access.lock();
            let now = Instant::now();
            for r in &results {
                let entry = access.entry(r.doc_id.clone()).or_insert(AccessEntry {
                    count: 0,
                    last_access: now,
                });
                entry.count += 1;
                entry.last_access = now;
            }
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        shared
            .last_latency_ms
            .store(elapsed_ms.to_bits(), Ordering::Relaxed);

        // Promotion runs in the background; the query never waits on it.
        let background = Arc::clone(shared);
        let (threshold, capacity) = (self.hot_threshold, self.memory_capacity);
        self.pool
            .submit(move || background.promote_hot(threshold, capacity));

        results
    }

    /// Runs a promotion pass now.
    ///
    /// Snapshots the access statistics under their lock, fetches hot
    /// documents not yet in memory from the persistent tier, and refits
    /// the memory index with the combined chunk set. Promotion stops at
    /// capacity; cold entries are never evicted.
    pub fn promote_hot(&self) {
        self.shared
            .promote_hot(self.hot_threshold, self.memory_capacity);
    }

    /// doc_ids currently served from memory.
    pub fn memory_doc_ids(&self) -> HashSet<String> {
        self.shared.memory_ids.read().clone()
    }

    /// Latency of the most recent search, in milliseconds.
    pub fn last_latency_ms(&self) -> f64 {
        f64::from_bits(self.shared.last_latency_ms.load(Ordering::Relaxed))
    }

    /// Aggregated statistics across both tiers.
    pub fn system_stats(&self) -> SystemStats {
        let access = self.shared.access.lock();
        let hot_docs = access
            .values()
            .filter(|e| e.count >= self.hot_threshold)
            .count();
        let tracked_docs = access.len();
        drop(access);

        SystemStats {
            store: self.shared.persistent.get_stats(),
            memory_docs: self.shared.memory_ids.read().len(),
            memory_chunks: self.shared.memory.bm25_doc_count(),
            bm25_vocabulary: self.shared.memory.bm25_vocabulary_size(),
            hot_docs,
            tracked_docs,
        }
    }
}
