//! Text embedding abstraction and the deterministic fallback provider.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Discriminates document from query embeddings, allowing asymmetric
/// encoders behind the same trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Document,
    Query,
}

/// Maps text to a fixed-dimension, unit-normalized real vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds `text`. The returned vector has length [`dimension`] and is
    /// expected to be unit-normalized.
    ///
    /// [`dimension`]: EmbeddingProvider::dimension
    fn embed(&self, text: &str, kind: EmbeddingKind) -> Vec<f32>;

    /// Output vector length.
    fn dimension(&self) -> usize;
}

/// Deterministic fallback embedder.
///
/// Seeds an RNG from a stable 64-bit hash of the text and emits a
/// normalized Gaussian vector, so identical inputs produce identical
/// vectors across process lifetimes. Symmetric: the kind tag is ignored.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingProvider for HashEmbedding {
    fn embed(&self, text: &str, _kind: EmbeddingKind) -> Vec<f32> {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(text.as_bytes());
        let mut rng = StdRng::seed_from_u64(hasher.finish());

        let mut vector = Vec::with_capacity(self.dimension);
        while vector.len() < self.dimension {
            // Box-Muller transform over two uniforms in (0, 1].
            let u1: f64 = 1.0 - rng.gen::<f64>();
            let u2: f64 = rng.gen();
            let radius = (-2.0 * u1.ln()).sqrt();
            let angle = 2.0 * std::f64::consts::PI * u2;
            vector.push((radius * angle.cos()) as f32);
            if vector.len() < self.dimension {
                vector.push((radius * angle.sin()) as f32);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_across_instances() {
        let a = HashEmbedding::new(64);
        let b = HashEmbedding::new(64);
        let va = a.embed("retrieval augmented generation", EmbeddingKind::Document);
        let vb = b.embed("retrieval augmented generation", EmbeddingKind::Query);
        assert_eq!(va, vb);
    }

    #[test]
    fn test_unit_norm() {
        let e = HashEmbedding::new(128);
        let v = e.embed("some text", EmbeddingKind::Document);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
    }

    #[test]
    fn test_dimension() {
        for dim in [1, 7, 768] {
            let e = HashEmbedding::new(dim);
            assert_eq!(e.embed("x", EmbeddingKind::Document).len(), dim);
            assert_eq!(e.dimension(), dim);
        }
    }

    #[test]
    fn test_different_texts_differ() {
        let e = HashEmbedding::new(32);
        let a = e.embed("alpha", EmbeddingKind::Document);
        let b = e.embed("beta", EmbeddingKind::Document);
        assert_ne!(a, b);
    }
}
