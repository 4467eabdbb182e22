//! Hybrid ranking for Vitrine.
//!
//! [`RankingPipeline`] turns a [`SearchQuery`] into ranked, explained
//! results. It resolves query embeddings (cache first), fuses them,
//! retrieves alpha-consistent candidates from the shared store, and then
//! applies boosts, near-duplicate suppression and category diversity.
//!
//! # Example
//!
//! ```rust
//! # tokio_test::block_on(async {
//! use std::sync::Arc;
//! use vitrine_cache::{CacheConfig, CacheManager};
//! use vitrine_core::ProductRecord;
//! use vitrine_rank::{RankingConfig, RankingPipeline, SearchQuery};
//! use vitrine_vector::{MockEncoder, VectorConfig, VectorStore};
//!
//! let mut store = VectorStore::new(VectorConfig::with_dimension(2));
//! store
//!     .insert(&[1.0, 0.0], ProductRecord::new("p-1", "Red Dress").with_text_embedding(vec![1.0, 0.0]))
//!     .unwrap();
//!
//! let encoder = Arc::new(MockEncoder::new(2).with_text("red dress", vec![1.0, 0.0]));
//! let pipeline = RankingPipeline::new(
//!     store.into_shared(),
//!     encoder,
//!     CacheManager::memory(CacheConfig::default()),
//!     RankingConfig::default(),
//! );
//!
//! let response = pipeline.search(&SearchQuery::text("Red Dress")).await.unwrap();
//! assert_eq!(response.ids(), vec!["p-1"]);
//! # });
//! ```

pub mod boost;
pub mod dedup;
pub mod explain;
pub mod fusion;
pub mod pipeline;
pub mod query;
pub mod types;

pub use boost::{
    AppliedBoost, BOOST_CEILING, BoostClass, BoostContext, BoostHook, ContextBoost,
    KeywordMatchBoost, RelevanceAdjustment, RelevanceFlag, VisualMatchBoost,
};
pub use dedup::{Deduplicator, ImageHash, compute_image_hash};
pub use fusion::{FusionEngine, FusionMethod, MIN_DIVERSITY_FACTOR, MatchScores};
pub use pipeline::{RankingConfig, RankingPipeline};
pub use query::{MAX_TOP_K, QueryContext, SearchQuery, normalize_query_text, preprocess_text};
pub use types::{RankedResult, SearchMetadata, SearchResponse, StageTimings};
