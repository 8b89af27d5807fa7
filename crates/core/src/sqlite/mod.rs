//! Persistent retrieval tier backed by an embedded SQLite store.
//!
//! [`SqliteStore`] owns the schema and raw search primitives;
//! [`PersistentRetriever`] layers strategy selection, result caching, and
//! worker-pool dispatch on top of it.

mod retriever;
mod store;

pub use retriever::{PersistConfig, PersistStrategy, PersistentRetriever};
pub use store::{SqliteStore, StoreStats, StoredHit};
