//! Vector retrieval infrastructure for Vitrine.
//!
//! This crate owns the product index: an ANN index plus the metadata table
//! that maps index slots back to products, alpha-consistent hybrid
//! retrieval, on-disk persistence, and the embedding encoder contract.
//!
//! # Features
//!
//! - `encoder-fastembed`: Enable the local CLIP encoder via fastembed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     vitrine-vector                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorStore (index + metadata table, tombstones)           │
//! │  ├── search         (k-NN on index vectors)                 │
//! │  └── hybrid_search  (re-scored with the query alpha)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AnnIndex trait                                             │
//! │  └── FlatIndex (exact inner product, rkyv persistence)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingEncoder trait                                     │
//! │  ├── MockEncoder (always available)                         │
//! │  ├── RetryingEncoder (backon exponential backoff)           │
//! │  └── ClipEncoder (feature: encoder-fastembed)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Persistence (products.index + metadata.json sidecar)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use vitrine_core::ProductRecord;
//! use vitrine_vector::{SearchFilters, VectorConfig, VectorStore};
//!
//! let mut store = VectorStore::new(VectorConfig::with_dimension(2));
//! store.insert(&[1.0, 0.0], ProductRecord::new("p-1", "Red Dress")).unwrap();
//!
//! let hits = store.search(&[1.0, 0.0], 5, &SearchFilters::none()).unwrap();
//! assert_eq!(hits[0].record.id, "p-1");
//! ```

// Core modules (always available)
pub mod ann;
pub mod store;
pub mod types;

// Encoders
pub mod encoder;
pub mod retry;

// Persistence
pub mod persistence;

// Feature-gated encoder
#[cfg(feature = "encoder-fastembed")]
pub mod clip;

// Re-exports: core types
pub use ann::{AnnIndex, FlatIndex, Neighbor};
pub use store::{SharedStore, VectorStore};
pub use types::{
    Candidate, HealthStatus, HybridFallback, SearchFilters, VectorConfig, VectorStoreStats,
};

// Re-exports: encoders
pub use encoder::{EmbeddingEncoder, MAX_ENCODED_CHARS, MockEncoder, truncate_for_encoding};
pub use retry::RetryingEncoder;

#[cfg(feature = "encoder-fastembed")]
pub use clip::ClipEncoder;

// Re-exports: persistence
pub use persistence::{INDEX_FILE, IndexMetadata, METADATA_FILE};
