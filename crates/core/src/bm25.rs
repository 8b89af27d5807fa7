//! Okapi BM25 lexical index.
//!
//! Holds per-document term frequencies, document frequencies, and document
//! lengths. `fit` replaces all state atomically behind an exclusive writer
//! guard; queries take shared read guards and may proceed in parallel.

use crate::chunk::Chunk;
use crate::config::Bm25Config;
use crate::tokenizer::Tokenizer;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Bm25Data {
    /// Per-document term frequencies, in fit order.
    tfs: Vec<HashMap<String, u32>>,
    /// Per-document token counts, parallel to `tfs`.
    doc_lengths: Vec<u32>,
    /// token → number of documents containing it.
    df: HashMap<String, u32>,
    /// Mean document length in tokens; 0 for an empty corpus.
    avgdl: f32,
}

/// Lexical scorer over a fitted chunk list.
///
/// Scores every fitted document for each query: unknown terms contribute
/// zero and zero-score documents stay eligible, ranked after any positive
/// score by the stable descending sort (ties keep original chunk order).
#[derive(Debug)]
pub struct Bm25Index {
    k1: f32,
    b: f32,
    tokenizer: Tokenizer,
    data: RwLock<Bm25Data>,
}

impl Bm25Index {
    pub fn new(config: &Bm25Config, tokenizer: Tokenizer) -> Self {
        Self {
            k1: config.k1,
            b: config.b,
            tokenizer,
            data: RwLock::new(Bm25Data::default()),
        }
    }

    /// Rebuilds the index from a chunk list.
    ///
    /// The new tables are constructed off-lock and swapped in under the
    /// write guard, so readers observe either the old or the new state.
    pub fn fit(&self, chunks: &[Chunk]) {
        let mut next = Bm25Data {
            tfs: Vec::with_capacity(chunks.len()),
            doc_lengths: Vec::with_capacity(chunks.len()),
            ..Bm25Data::default()
        };

        let mut total_len = 0u64;
        for chunk in chunks {
            let tokens = self.tokenizer.tokenize(&chunk.text);
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.clone()).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *next.df.entry(term.clone()).or_insert(0) += 1;
            }
            next.doc_lengths.push(tokens.len() as u32);
            total_len += tokens.len() as u64;
            next.tfs.push(tf);
        }
        next.avgdl = if chunks.is_empty() {
            0.0
        } else {
            total_len as f32 / chunks.len() as f32
        };

        *self.data.write() = next;
    }

    /// `idf(t) = ln(1 + (N − df + 0.5) / (df + 0.5))`
    fn idf(n: usize, df: u32) -> f32 {
        (1.0 + (n as f32 - df as f32 + 0.5) / (df as f32 + 0.5)).ln()
    }

    /// Scores every document against the query terms.
    ///
    /// Returns `(chunk index, score)` pairs sorted by descending score,
    /// truncated to `top_k`. Empty term lists yield empty results.
    pub fn query(&self, terms: &[String], top_k: usize) -> Vec<(usize, f32)> {
        if terms.is_empty() {
            return Vec::new();
        }
        let data = self.data.read();
        let n = data.tfs.len();
        if n == 0 {
            return Vec::new();
        }

        let avgdl = if data.avgdl > 0.0 { data.avgdl } else { 1.0 };
        let mut scores: Vec<(usize, f32)> = Vec::with_capacity(n);
        for (i, tf) in data.tfs.iter().enumerate() {
            let doclen = data.doc_lengths[i] as f32;
            let mut score = 0.0f32;
            for term in terms {
                let f = tf.get(term).copied().unwrap_or(0) as f32;
                let df = data.df.get(term).copied().unwrap_or(0);
                let denom = f + self.k1 * (1.0 - self.b + self.b * doclen / avgdl);
                if denom > 0.0 {
                    score += Self::idf(n, df) * (f * (self.k1 + 1.0)) / denom;
                }
            }
            scores.push((i, score));
        }

        // Stable sort: ties keep original chunk order.
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(top_k);
        scores
    }

    /// Tokenizes the raw text and scores it.
    pub fn query_text(&self, text: &str, top_k: usize) -> Vec<(usize, f32)> {
        let terms = self.tokenizer.tokenize(text);
        self.query(&terms, top_k)
    }

    /// Number of fitted documents.
    pub fn doc_count(&self) -> usize {
        self.data.read().tfs.len()
    }

    /// Number of distinct tokens in the vocabulary.
    pub fn vocabulary_size(&self) -> usize {
        self.data.read().df.len()
    }

    /// Mean document length in tokens.
    pub fn avgdl(&self) -> f32 {
        self.data.read().avgdl
    }

    /// Number of documents containing `term` (0 for unknown terms).
    pub fn document_frequency(&self, term: &str) -> u32 {
        self.data.read().df.get(term).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bm25Config;
    use crate::tokenizer::{Tokenizer, TokenizerConfig};

    fn index_with(k1: f32, b: f32) -> Bm25Index {
        // Stopword filtering off so short test corpora keep every term.
        let tokenizer = Tokenizer::new(TokenizerConfig {
            filter_stopwords: false,
            ..TokenizerConfig::default()
        });
        Bm25Index::new(&Bm25Config { k1, b }, tokenizer)
    }

    fn fitted(k1: f32, b: f32, texts: &[&str]) -> Bm25Index {
        let idx = index_with(k1, b);
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(format!("d{i}"), 0, *t))
            .collect();
        idx.fit(&chunks);
        idx
    }

    #[test]
    fn test_shorter_doc_ranks_first_under_length_normalization() {
        let idx = fitted(1.5, 0.75, &["machine learning", "deep learning networks"]);
        let results = idx.query(&["learning".to_string()], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0, "shorter doc should rank first when b > 0");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_empty_corpus() {
        let idx = index_with(1.5, 0.75);
        idx.fit(&[]);
        assert_eq!(idx.avgdl(), 0.0);
        assert!(idx.query(&["anything".to_string()], 10).is_empty());
    }

    #[test]
    fn test_empty_query_terms() {
        let idx = fitted(1.5, 0.75, &["some document text"]);
        assert!(idx.query(&[], 10).is_empty());
        assert!(idx.query_text("", 10).is_empty());
    }

    #[test]
    fn test_unknown_terms_score_zero_but_stay_eligible() {
        let idx = fitted(1.5, 0.75, &["alpha beta", "gamma delta"]);
        let results = idx.query(&["zzz".to_string()], 10);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|&(_, s)| s == 0.0));
        // Ties keep original chunk order.
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
    }

    #[test]
    fn test_zero_scores_rank_after_positives() {
        let idx = fitted(1.5, 0.75, &["nothing here", "target term here"]);
        let results = idx.query(&["target".to_string()], 10);
        assert_eq!(results[0].0, 1);
        assert!(results[0].1 > 0.0);
        assert_eq!(results[1].1, 0.0);
    }

    #[test]
    fn test_k1_zero_reduces_to_idf() {
        let idx = fitted(0.0, 0.75, &["rust rust rust", "rust once"]);
        let results = idx.query(&["rust".to_string()], 10);
        // With k1 = 0 the score is pure IDF for any positive tf, so both
        // documents score identically despite different term frequencies.
        assert!((results[0].1 - results[1].1).abs() < 1e-6);
        let expected = (1.0f32 + (2.0 - 2.0 + 0.5) / 2.5).ln();
        assert!((results[0].1 - expected).abs() < 1e-6);
    }

    #[test]
    fn test_b_zero_removes_length_influence() {
        let idx = fitted(1.5, 0.0, &["learning", "learning filler filler filler"]);
        let results = idx.query(&["learning".to_string()], 10);
        assert!((results[0].1 - results[1].1).abs() < 1e-6);
    }

    #[test]
    fn test_document_frequency_invariant() {
        let idx = fitted(
            1.5,
            0.75,
            &["shared unique1", "shared unique2", "shared shared"],
        );
        assert_eq!(idx.document_frequency("shared"), 3);
        assert_eq!(idx.document_frequency("unique1"), 1);
        assert_eq!(idx.document_frequency("missing"), 0);
        assert!(idx.document_frequency("shared") <= idx.doc_count() as u32);
    }

    #[test]
    fn test_avgdl_is_mean_token_count() {
        let idx = fitted(1.5, 0.75, &["one two three", "four five"]);
        assert!((idx.avgdl() - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_refit_is_deterministic() {
        let texts = ["machine learning", "deep learning networks", "rust systems"];
        let idx = fitted(1.5, 0.75, &texts);
        let first = idx.query_text("learning systems", 10);

        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(format!("d{i}"), 0, *t))
            .collect();
        idx.fit(&chunks);
        let second = idx.query_text("learning systems", 10);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1, b.1);
        }
    }

    #[test]
    fn test_refit_replaces_state() {
        let idx = fitted(1.5, 0.75, &["old corpus entry"]);
        assert_eq!(idx.doc_count(), 1);
        idx.fit(&[Chunk::new("n", 0, "new corpus"), Chunk::new("n", 1, "second")]);
        assert_eq!(idx.doc_count(), 2);
        assert_eq!(idx.document_frequency("old"), 0);
    }

    #[test]
    fn test_top_k_truncation() {
        let idx = fitted(1.5, 0.75, &["a b", "b c", "c d", "d e"]);
        assert_eq!(idx.query(&["b".to_string()], 2).len(), 2);
    }

    #[test]
    fn test_vocabulary_size() {
        let idx = fitted(1.5, 0.75, &["alpha beta", "beta gamma"]);
        assert_eq!(idx.vocabulary_size(), 3);
    }
}
