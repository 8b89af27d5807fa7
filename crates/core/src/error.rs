//! Error types for the retrieval engine.

use thiserror::Error;

/// All failure modes surfaced by the engine.
///
/// Ingest errors are reported per chunk (a bad chunk is skipped and the
/// insert count reflects only successes). Query-path errors degrade to
/// empty result lists rather than aborting the other retrieval leg.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid or missing configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The persistent store could not be opened or a statement failed.
    #[error("backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    /// A configured vector extension could not be loaded. Vector queries
    /// fall back to the in-process scan; the system keeps running.
    #[error("vector extension unavailable: {0}")]
    ExtensionUnavailable(String),

    /// Malformed UTF-8 encountered while decoding stored text.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// An embedding's length differs from the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Stop was requested while background work was pending, or a pooled
    /// task was lost before producing its value.
    #[error("cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RagError>;
