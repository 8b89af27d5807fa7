//! Runtime configuration for the retrieval engine.
//!
//! A [`RagConfig`] is an explicit record threaded through constructors;
//! components receive only the slices they need. All groups and fields
//! carry defaults, so a partial (or absent) TOML file deserializes into a
//! working configuration.

use crate::error::{RagError, Result};
use serde::Deserialize;

/// Text chunking parameters (used by ingestion front-ends).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Target chunk size in characters.
    pub size: usize,
    /// Overlap between consecutive chunks.
    pub overlap: usize,
    /// Chunks shorter than this are merged forward.
    pub min_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 512,
            overlap: 128,
            min_size: 64,
        }
    }
}

/// Okapi BM25 parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Bm25Config {
    /// Term-frequency saturation. Higher values let TF grow further.
    pub k1: f32,
    /// Document-length normalization: 0 disables it, 1 is full strength.
    pub b: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Vector-store sizing parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Bidirectional links per node (graph-backed implementations).
    #[serde(rename = "M")]
    pub m: usize,
    /// Candidate-list size during construction.
    pub ef_construction: usize,
    /// Candidate-list size during query; seeds the auto-tuner's `ef`.
    pub ef_query: usize,
    /// Embedding dimension.
    pub vector_dim: usize,
    /// Capacity hint for the store.
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_query: 50,
            vector_dim: 768,
            max_elements: 10_000,
        }
    }
}

/// Fusion strategy for the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Lexical scoring only.
    Bm25Only,
    /// Dense retrieval only.
    VectorOnly,
    /// Both legs; defaults to weighted fusion.
    Hybrid,
    /// Reciprocal Rank Fusion.
    Rrf,
    /// Min-max normalized weighted combination.
    Weighted,
}

/// Memory-tier fusion parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub strategy: FusionStrategy,
    pub bm25_weight: f32,
    pub vector_weight: f32,
    /// Per-leg candidate cap for hybrid strategies.
    pub max_candidates: usize,
    /// RRF constant `k`.
    pub rrf_k: f32,
    /// Exposes the reranker hook; no built-in implementation ships.
    pub enable_rerank: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: FusionStrategy::Hybrid,
            bm25_weight: 0.5,
            vector_weight: 0.5,
            max_candidates: 100,
            rrf_k: 60.0,
            enable_rerank: true,
        }
    }
}

/// Result-cache parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached fingerprints.
    pub capacity: usize,
    /// Entries older than this are treated as absent.
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl_seconds: 3600,
        }
    }
}

/// Worker-pool sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    pub num_workers: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self { num_workers: 8 }
    }
}

/// Auto-tuner thresholds and step sizes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Latency ceiling; exceeding it shrinks `ef` and `topK`.
    pub latency_max_ms: f64,
    /// Recall floor; dropping below it grows `ef` and `topK`.
    pub recall_min_pct: f64,
    pub ef_delta: usize,
    pub topk_delta: usize,
    pub enable: bool,
    pub check_interval_seconds: u64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            latency_max_ms: 200.0,
            recall_min_pct: 0.8,
            ef_delta: 5,
            topk_delta: 2,
            enable: true,
            check_interval_seconds: 10,
        }
    }
}

/// Persistent-tier (SQLite) parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path.
    pub db_path: String,
    /// Name of a loadable vector extension. Vector similarity runs
    /// in-process; a configured extension is reported once and ignored.
    pub vector_extension: String,
    /// Stored embedding dimension.
    pub vector_dimension: usize,
    /// Create and query the FTS5 virtual table.
    pub enable_fts5: bool,
    /// WAL journal mode.
    pub enable_wal: bool,
    /// SQLite page-cache size (pages).
    pub cache_size: i64,
    /// Busy-wait timeout for contended writes, in milliseconds.
    pub busy_timeout: u64,
    /// Candidate count for the full-text leg of hybrid queries.
    pub fts5_limit: usize,
    /// Candidate count for the vector leg of hybrid queries.
    pub vector_limit: usize,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: "fusedb.db".to_string(),
            vector_extension: String::new(),
            vector_dimension: 768,
            enable_fts5: true,
            enable_wal: true,
            cache_size: 10_000,
            busy_timeout: 30_000,
            fts5_limit: 50,
            vector_limit: 50,
        }
    }
}

/// Top-level configuration record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub chunk: ChunkConfig,
    pub bm25: Bm25Config,
    pub hnsw: HnswConfig,
    pub fusion: FusionConfig,
    pub cache: CacheConfig,
    pub threadpool: ThreadPoolConfig,
    pub tuner: TunerConfig,
    pub sqlite: SqliteConfig,
}

impl RagConfig {
    /// Rejects out-of-range values before any component is built.
    ///
    /// `k1 = 0` and `b = 0` are legal (they degenerate BM25 to pure IDF
    /// and disable length normalization); negative, non-finite, or empty
    /// values are not.
    pub fn validate(&self) -> Result<()> {
        fn fail(message: String) -> Result<()> {
            Err(RagError::Config(message))
        }

        if !self.bm25.k1.is_finite() || self.bm25.k1 < 0.0 {
            return fail(format!("bm25.k1 must be non-negative, got {}", self.bm25.k1));
        }
        if !self.bm25.b.is_finite() || !(0.0..=1.0).contains(&self.bm25.b) {
            return fail(format!("bm25.b must lie in [0, 1], got {}", self.bm25.b));
        }
        if self.hnsw.vector_dim == 0 {
            return fail("hnsw.vector_dim must be positive".to_string());
        }
        if self.hnsw.max_elements == 0 {
            return fail("hnsw.max_elements must be positive".to_string());
        }
        if !self.fusion.bm25_weight.is_finite() || self.fusion.bm25_weight < 0.0 {
            return fail(format!(
                "fusion.bm25_weight must be non-negative, got {}",
                self.fusion.bm25_weight
            ));
        }
        if !self.fusion.vector_weight.is_finite() || self.fusion.vector_weight < 0.0 {
            return fail(format!(
                "fusion.vector_weight must be non-negative, got {}",
                self.fusion.vector_weight
            ));
        }
        if self.fusion.max_candidates == 0 {
            return fail("fusion.max_candidates must be positive".to_string());
        }
        if !self.fusion.rrf_k.is_finite() || self.fusion.rrf_k <= 0.0 {
            return fail(format!(
                "fusion.rrf_k must be positive, got {}",
                self.fusion.rrf_k
            ));
        }
        if self.cache.capacity == 0 {
            return fail("cache.capacity must be positive".to_string());
        }
        if self.threadpool.num_workers == 0 {
            return fail("threadpool.num_workers must be positive".to_string());
        }
        if !self.tuner.latency_max_ms.is_finite() || self.tuner.latency_max_ms <= 0.0 {
            return fail(format!(
                "tuner.latency_max_ms must be positive, got {}",
                self.tuner.latency_max_ms
            ));
        }
        if !self.tuner.recall_min_pct.is_finite()
            || !(0.0..=1.0).contains(&self.tuner.recall_min_pct)
        {
            return fail(format!(
                "tuner.recall_min_pct must lie in [0, 1], got {}",
                self.tuner.recall_min_pct
            ));
        }
        if self.sqlite.db_path.is_empty() {
            return fail("sqlite.db_path must not be empty".to_string());
        }
        if self.sqlite.vector_dimension == 0 {
            return fail("sqlite.vector_dimension must be positive".to_string());
        }
        if self.sqlite.fts5_limit == 0 || self.sqlite.vector_limit == 0 {
            return fail("sqlite.fts5_limit and sqlite.vector_limit must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = RagConfig::default();
        assert_eq!(cfg.bm25.k1, 1.5);
        assert_eq!(cfg.bm25.b, 0.75);
        assert_eq!(cfg.hnsw.vector_dim, 768);
        assert_eq!(cfg.fusion.max_candidates, 100);
        assert_eq!(cfg.fusion.rrf_k, 60.0);
        assert_eq!(cfg.cache.capacity, 1024);
        assert_eq!(cfg.threadpool.num_workers, 8);
        assert_eq!(cfg.tuner.latency_max_ms, 200.0);
        assert_eq!(cfg.sqlite.busy_timeout, 30_000);
        assert_eq!(cfg.sqlite.fts5_limit, 50);
    }

    #[test]
    fn test_default_record_is_usable() {
        let cfg = RagConfig::default();
        assert!(cfg.sqlite.enable_fts5);
        assert!(cfg.tuner.enable);
        assert_eq!(cfg.fusion.strategy, FusionStrategy::Hybrid);
        assert_eq!(cfg.fusion.bm25_weight + cfg.fusion.vector_weight, 1.0);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn test_boundary_bm25_parameters_validate() {
        // k1 = 0 (pure IDF) and b = 0 (no length normalization) are legal.
        let mut cfg = RagConfig::default();
        cfg.bm25.k1 = 0.0;
        cfg.bm25.b = 0.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        use crate::error::RagError;

        let cases: Vec<(&str, Box<dyn Fn(&mut RagConfig)>)> = vec![
            ("negative k1", Box::new(|c| c.bm25.k1 = -0.5)),
            ("b above one", Box::new(|c| c.bm25.b = 1.5)),
            ("zero vector_dim", Box::new(|c| c.hnsw.vector_dim = 0)),
            ("zero max_candidates", Box::new(|c| c.fusion.max_candidates = 0)),
            ("negative weight", Box::new(|c| c.fusion.vector_weight = -1.0)),
            ("zero rrf_k", Box::new(|c| c.fusion.rrf_k = 0.0)),
            ("zero cache capacity", Box::new(|c| c.cache.capacity = 0)),
            ("zero workers", Box::new(|c| c.threadpool.num_workers = 0)),
            ("zero latency ceiling", Box::new(|c| c.tuner.latency_max_ms = 0.0)),
            ("recall above one", Box::new(|c| c.tuner.recall_min_pct = 2.0)),
            ("empty db_path", Box::new(|c| c.sqlite.db_path = String::new())),
            ("zero stored dimension", Box::new(|c| c.sqlite.vector_dimension = 0)),
            ("zero fts limit", Box::new(|c| c.sqlite.fts5_limit = 0)),
        ];
        for (name, mutate) in cases {
            let mut cfg = RagConfig::default();
            mutate(&mut cfg);
            let err = cfg.validate().expect_err(name);
            assert!(matches!(err, RagError::Config(_)), "{name}");
        }
    }
}
