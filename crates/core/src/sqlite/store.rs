//! SQLite-backed durable chunk store.
//!
//! Three logical tables: `chunks` (one row per chunk, auto-assigned
//! integer id), `chunks_fts` (external-content FTS5 mirror of `content`),
//! and `embeddings` (one vector blob per chunk). All writes serialize
//! under a single connection mutex; bulk insertion runs in one
//! transaction and explicitly rebuilds the full-text index afterwards.

use crate::chunk::Chunk;
use crate::config::SqliteConfig;
use crate::error::{RagError, Result};
use crate::vector::cosine_similarity;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// A scored row from the persistent tier.
#[derive(Debug, Clone, Default)]
pub struct StoredHit {
    /// Backend row id (`chunks.id`).
    pub chunk_id: i64,
    pub doc_id: String,
    pub seq_no: u32,
    pub topic: String,
    pub content: String,
    /// Raw full-text rank, cosine similarity, or fused score depending on
    /// the query that produced the hit.
    pub score: f32,
}

/// Aggregate backend statistics.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_chunks: u64,
    pub total_embeddings: u64,
    pub db_size_mb: f64,
    pub last_update: String,
}

/// Durable store over one SQLite database file.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: SqliteConfig,
}

impl SqliteStore {
    /// Opens (or creates) the database, applies pragmas, and initializes
    /// the schema.
    pub fn open(config: SqliteConfig) -> Result<Self> {
        if config.db_path.is_empty() {
            return Err(RagError::Config("sqlite.db_path must not be empty".to_string()));
        }
        if config.vector_dimension == 0 {
            return Err(RagError::Config(
                "sqlite.vector_dimension must be positive".to_string(),
            ));
        }
        let conn = Connection::open(&config.db_path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout))?;

        let journal = if config.enable_wal { "WAL" } else { "DELETE" };
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {journal};
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = {};
             PRAGMA temp_store = MEMORY;
             PRAGMA mmap_size = 268435456;",
            config.cache_size
        ))?;

        if !config.vector_extension.is_empty() {
            // Vector similarity runs in-process over the stored blobs; a
            // configured extension is reported once and ignored.
            let err = RagError::ExtensionUnavailable(config.vector_extension.clone());
            tracing::warn!("{err}; vector search uses the in-process scan");
        }

        let store = Self {
            conn: Mutex::new(conn),
            config,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 doc_id TEXT NOT NULL,
                 seq_no INTEGER NOT NULL,
                 topic TEXT,
                 content TEXT NOT NULL,
                 created_at DATETIME DEFAULT CURRENT_TIMESTAMP
             );
             CREATE TABLE IF NOT EXISTS embeddings (
                 chunk_id INTEGER PRIMARY KEY,
                 vector BLOB NOT NULL,
                 FOREIGN KEY(chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
             );
             CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id);
             CREATE INDEX IF NOT EXISTS idx_chunks_topic ON chunks(topic);
             CREATE INDEX IF NOT EXISTS idx_chunks_created ON chunks(created_at);",
        )?;
        if self.config.enable_fts5 {
            conn.execute_batch(
                "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                     content,
                     content='chunks',
                     content_rowid='id',
                     tokenize='unicode61 remove_diacritics 1'
                 );",
            )?;
        }
        Ok(())
    }

    /// Inserts chunks and their embeddings inside one transaction.
    ///
    /// Bad chunks are skipped; the returned count reflects only successful
    /// inserts. An embedding of the wrong dimension (or an empty one)
    /// skips the embedding row but keeps the chunk. The full-text index is
    /// rebuilt after the transaction commits.
    pub fn insert_chunks<F>(&self, chunks: &[Chunk], embed_fn: F) -> Result<usize>
    where
        F: Fn(&str) -> Vec<f32>,
    {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0usize;

        {
            let mut chunk_stmt = tx.prepare_cached(
                "INSERT INTO chunks(doc_id, seq_no, topic, content) VALUES(?1, ?2, ?3, ?4)",
            )?;
            let mut emb_stmt =
                tx.prepare_cached("INSERT INTO embeddings(chunk_id, vector) VALUES(?1, ?2)")?;

            for chunk in chunks {
                let row = chunk_stmt.insert(params![
                    chunk.doc_id,
                    chunk.seq_no,
                    chunk.topic,
                    chunk.text
                ]);
                let chunk_id = match row {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(chunk = %chunk.key(), "skipping chunk: {e}");
                        continue;
                    }
                };

                let embedding = embed_fn(&chunk.text);
                if embedding.len() == self.config.vector_dimension {
                    if let Err(e) = emb_stmt.execute(params![chunk_id, encode_vector(&embedding)])
                    {
                        tracing::warn!(chunk = %chunk.key(), "embedding insert failed: {e}");
                    }
                } else if !embedding.is_empty() {
                    let err = RagError::DimensionMismatch {
                        expected: self.config.vector_dimension,
                        actual: embedding.len(),
                    };
                    tracing::warn!(chunk = %chunk.key(), "skipping embedding: {err}");
                }
                inserted += 1;
            }
        }
        tx.commit()?;

        if self.config.enable_fts5 {
            conn.execute("INSERT INTO chunks_fts(chunks_fts) VALUES('rebuild')", [])?;
        }
        Ok(inserted)
    }

    /// Full-text search through FTS5, best match first.
    ///
    /// Scores are SQLite's raw `bm25()` values (lower is better); the
    /// hybrid merge normalizes them.
    pub fn search_fulltext(&self, query: &str, limit: usize) -> Result<Vec<StoredHit>> {
        if !self.config.enable_fts5 || query.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT c.id, c.doc_id, c.seq_no, c.topic, c.content, bm25(chunks_fts) AS score
             FROM chunks_fts
             JOIN chunks c ON chunks_fts.rowid = c.id
             WHERE chunks_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![query, limit as i64], |row| {
            Ok(StoredHit {
                chunk_id: row.get(0)?,
                doc_id: row.get(1)?,
                seq_no: row.get(2)?,
                topic: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                content: row.get(4)?,
                score: row.get::<_, f64>(5)? as f32,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Top-k cosine similarity over the stored embedding blobs.
    ///
    /// Runs in-process; no extension is required. Blobs whose decoded
    /// length differs from the query's are skipped.
    pub fn search_vector(&self, query: &[f32], limit: usize) -> Result<Vec<StoredHit>> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT c.id, c.doc_id, c.seq_no, c.topic, c.content, e.vector
             FROM embeddings e
             JOIN chunks c ON e.chunk_id = c.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                StoredHit {
                    chunk_id: row.get(0)?,
                    doc_id: row.get(1)?,
                    seq_no: row.get(2)?,
                    topic: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    content: row.get(4)?,
                    score: 0.0,
                },
                row.get::<_, Vec<u8>>(5)?,
            ))
        })?;

        // Partial sort: O(n log k) via min-heap of size k.
        let mut scored: Vec<StoredHit> = Vec::new();
        let mut heap: BinaryHeap<Reverse<(OrderedFloat<f32>, usize)>> =
            BinaryHeap::with_capacity(limit + 1);
        for row in rows.filter_map(|r| r.ok()) {
            let (mut hit, blob) = row;
            let vector = decode_vector(&blob);
            if vector.len() != query.len() {
                continue;
            }
            hit.score = cosine_similarity(query, &vector);
            heap.push(Reverse((OrderedFloat(hit.score), scored.len())));
            scored.push(hit);
            if heap.len() > limit {
                heap.pop();
            }
        }

        let mut hits: Vec<StoredHit> = heap
            .into_iter()
            .map(|Reverse((_, idx))| scored[idx].clone())
            .collect();
        hits.sort_unstable_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(hits)
    }

    /// Fetches chunks by backend row id, preserving the input order.
    pub fn get_chunks_by_ids(&self, chunk_ids: &[i64]) -> Result<Vec<StoredHit>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders = vec!["?"; chunk_ids.len()].join(",");
        let sql = format!(
            "SELECT id, doc_id, seq_no, topic, content FROM chunks WHERE id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk_ids.iter()), |row| {
            Ok(StoredHit {
                chunk_id: row.get(0)?,
                doc_id: row.get(1)?,
                seq_no: row.get(2)?,
                topic: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                content: row.get(4)?,
                score: 1.0,
            })
        })?;

        let mut by_id: HashMap<i64, StoredHit> = rows
            .filter_map(|r| r.ok())
            .map(|hit| (hit.chunk_id, hit))
            .collect();
        Ok(chunk_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    /// Fetches every chunk of one document, in sequence order.
    pub fn get_chunks_by_doc_id(&self, doc_id: &str) -> Result<Vec<StoredHit>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, doc_id, seq_no, topic, content FROM chunks
             WHERE doc_id = ?1 ORDER BY seq_no",
        )?;
        let rows = stmt.query_map(params![doc_id], |row| {
            Ok(StoredHit {
                chunk_id: row.get(0)?,
                doc_id: row.get(1)?,
                seq_no: row.get(2)?,
                topic: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                content: row.get(4)?,
                score: 1.0,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Removes every row from all three tables, then compacts the file.
    pub fn clear_all(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM embeddings", [])?;
        if self.config.enable_fts5 {
            tx.execute("INSERT INTO chunks_fts(chunks_fts) VALUES('delete-all')", [])?;
        }
        tx.execute("DELETE FROM chunks", [])?;
        tx.commit()?;
        // VACUUM cannot run inside a transaction.
        conn.execute("VACUUM", [])?;
        Ok(())
    }

    /// Row counts, database size, and last ingest time.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        let total_chunks: u64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
        let total_embeddings: u64 =
            conn.query_row("SELECT COUNT(*) FROM embeddings", [], |r| r.get(0))?;
        let size_bytes: f64 = conn.query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |r| r.get(0),
        )?;
        let last_update: Option<String> = conn
            .query_row("SELECT MAX(created_at) FROM chunks", [], |r| r.get(0))
            .optional()?
            .flatten();
        Ok(StoreStats {
            total_chunks,
            total_embeddings,
            db_size_mb: size_bytes / (1024.0 * 1024.0),
            last_update: last_update.unwrap_or_default(),
        })
    }
}

/// f32 slice → little-endian blob.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Little-endian blob → f32 vector. Trailing partial words are dropped.
fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, dimension: usize) -> SqliteStore {
        let config = SqliteConfig {
            db_path: dir
                .path()
                .join("test.db")
                .to_string_lossy()
                .into_owned(),
            vector_dimension: dimension,
            ..SqliteConfig::default()
        };
        SqliteStore::open(config).unwrap()
    }

    fn chunk(doc_id: &str, seq_no: u32, text: &str) -> Chunk {
        Chunk {
            doc_id: doc_id.to_string(),
            seq_no,
            topic: "test".to_string(),
            language: "en".to_string(),
            text: text.to_string(),
            created_at: 0,
        }
    }

    fn unit(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis % dim] = 1.0;
        v
    }

    #[test]
    fn test_insert_and_count() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 4);
        let inserted = store
            .insert_chunks(
                &[chunk("a", 0, "machine learning"), chunk("b", 0, "deep nets")],
                |_| unit(4, 0),
            )
            .unwrap();
        assert_eq!(inserted, 2);
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.total_embeddings, 2);
        assert!(stats.db_size_mb > 0.0);
        assert!(!stats.last_update.is_empty());
    }

    #[test]
    fn test_fulltext_search_matches() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 4);
        store
            .insert_chunks(
                &[
                    chunk("a", 0, "machine learning fundamentals"),
                    chunk("b", 0, "cooking with cast iron"),
                ],
                |_| unit(4, 0),
            )
            .unwrap();
        let hits = store.search_fulltext("machine", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "a");
        assert_eq!(hits[0].topic, "test");
    }

    #[test]
    fn test_fulltext_best_match_first() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 4);
        store
            .insert_chunks(
                &[
                    chunk("weak", 0, "retrieval mentioned once among many other words here"),
                    chunk("strong", 0, "retrieval retrieval retrieval"),
                ],
                |_| unit(4, 0),
            )
            .unwrap();
        let hits = store.search_fulltext("retrieval", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, "strong");
    }

    #[test]
    fn test_vector_search_ordering() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 2);
        let chunks = [chunk("x", 0, "x axis"), chunk("y", 0, "y axis")];
        store
            .insert_chunks(&chunks, |text| {
                if text.starts_with('x') {
                    vec![1.0, 0.0]
                } else {
                    vec![0.0, 1.0]
                }
            })
            .unwrap();
        let hits = store.search_vector(&[1.0, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, "x");
        assert!(hits[0].score > hits[1].score);
        for h in &hits {
            assert!((-1.0..=1.0).contains(&h.score));
        }
    }

    #[test]
    fn test_wrong_dimension_embedding_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 4);
        let inserted = store
            .insert_chunks(&[chunk("a", 0, "text")], |_| vec![1.0, 2.0])
            .unwrap();
        assert_eq!(inserted, 1, "chunk is kept");
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_embeddings, 0, "embedding is skipped");
    }

    #[test]
    fn test_get_chunks_by_ids_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 4);
        store
            .insert_chunks(
                &[chunk("a", 0, "first"), chunk("b", 0, "second"), chunk("c", 0, "third")],
                |_| unit(4, 0),
            )
            .unwrap();
        let all = store.search_fulltext("first OR second OR third", 10).unwrap();
        assert_eq!(all.len(), 3);

        let hits = store.get_chunks_by_ids(&[3, 1]).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, 3);
        assert_eq!(hits[1].chunk_id, 1);
        assert_eq!(hits[1].content, "first");
    }

    #[test]
    fn test_get_chunks_by_doc_id() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 4);
        store
            .insert_chunks(
                &[chunk("doc", 1, "part two"), chunk("doc", 0, "part one"), chunk("other", 0, "x")],
                |_| unit(4, 0),
            )
            .unwrap();
        let hits = store.get_chunks_by_doc_id("doc").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].seq_no, 0);
        assert_eq!(hits[1].seq_no, 1);
    }

    #[test]
    fn test_clear_all() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 4);
        store
            .insert_chunks(&[chunk("a", 0, "content")], |_| unit(4, 0))
            .unwrap();
        store.clear_all().unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_chunks, 0);
        assert_eq!(stats.total_embeddings, 0);
        assert!(store.search_fulltext("content", 10).unwrap().is_empty());
        assert!(store.search_vector(&unit(4, 0), 10).unwrap().is_empty());
    }

    #[test]
    fn test_empty_query_and_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, 4);
        assert!(store.search_fulltext("", 10).unwrap().is_empty());
        assert!(store.search_fulltext("anything", 10).unwrap().is_empty());
        assert!(store.search_vector(&[], 10).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected_on_open() {
        let config = SqliteConfig {
            db_path: String::new(),
            ..SqliteConfig::default()
        };
        let err = SqliteStore::open(config).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));

        let dir = TempDir::new().unwrap();
        let config = SqliteConfig {
            db_path: dir.path().join("dim.db").to_string_lossy().into_owned(),
            vector_dimension: 0,
            ..SqliteConfig::default()
        };
        let err = SqliteStore::open(config).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn test_vector_roundtrip_encoding() {
        let original = vec![0.25f32, -1.5, 3.0e-7, 42.0];
        assert_eq!(decode_vector(&encode_vector(&original)), original);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.db").to_string_lossy().into_owned();
        let config = SqliteConfig {
            db_path: path.clone(),
            vector_dimension: 2,
            ..SqliteConfig::default()
        };
        {
            let store = SqliteStore::open(config.clone()).unwrap();
            store
                .insert_chunks(&[chunk("a", 0, "durable text")], |_| vec![1.0, 0.0])
                .unwrap();
        }
        let store = SqliteStore::open(config).unwrap();
        assert_eq!(store.stats().unwrap().total_chunks, 1);
        assert_eq!(store.search_fulltext("durable", 5).unwrap().len(), 1);
    }
}
