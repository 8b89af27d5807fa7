//! Core retrieval unit types.
//!
//! A [`Chunk`] is the unit of ingestion and retrieval: a paragraph-sized
//! text with a stable `(doc_id, seq_no)` identity, an optional topic label
//! and a language tag. Chunks are created at ingest and never modified in
//! place; index rebuilds replace all derived state.

use serde::{Deserialize, Serialize};

/// A stored text chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    /// Free-form document identifier.
    pub doc_id: String,
    /// Sequence number within the document. `(doc_id, seq_no)` is the
    /// logical identity of a chunk.
    pub seq_no: u32,
    /// Optional topic label.
    pub topic: String,
    /// Language tag: `"zh"`, `"en"`, or empty when unknown.
    pub language: String,
    /// UTF-8 text payload, indexed by both tiers.
    pub text: String,
    /// Ingest timestamp (Unix seconds). Informational.
    pub created_at: i64,
}

impl Chunk {
    /// Creates a chunk with the given identity and text.
    pub fn new(doc_id: impl Into<String>, seq_no: u32, text: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            seq_no,
            text: text.into(),
            ..Self::default()
        }
    }

    /// The unique key for this chunk's identity.
    pub fn key(&self) -> String {
        doc_key(&self.doc_id, self.seq_no)
    }
}

/// A scored retrieval result from either tier.
///
/// Scores are produced by heterogeneous scorers (raw BM25, cosine
/// similarity, fused combinations); the fusion layer normalizes before
/// combining, so only relative order within one list is meaningful.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub doc_id: String,
    pub seq_no: u32,
    pub score: f32,
    pub text: String,
}

impl RetrievalResult {
    pub fn new(doc_id: impl Into<String>, seq_no: u32, score: f32, text: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            seq_no,
            score,
            text: text.into(),
        }
    }

    /// The unique key for this result's identity.
    pub fn key(&self) -> String {
        doc_key(&self.doc_id, self.seq_no)
    }
}

/// Canonical `(doc_id, seq_no)` key used for deduplication and fusion.
pub fn doc_key(doc_id: &str, seq_no: u32) -> String {
    format!("{doc_id}_{seq_no}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_key_format() {
        assert_eq!(doc_key("a", 0), "a_0");
        assert_eq!(Chunk::new("doc", 3, "text").key(), "doc_3");
    }

    #[test]
    fn test_chunk_defaults() {
        let c = Chunk::new("d", 1, "hello");
        assert!(c.topic.is_empty());
        assert!(c.language.is_empty());
        assert_eq!(c.created_at, 0);
    }
}
