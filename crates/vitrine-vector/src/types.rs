//! Common types for the vector store.
//!
//! Configuration, filters, retrieval candidates, and statistics. These are
//! used by the store itself and by the ranking pipeline that drives it.

use serde::{Deserialize, Serialize};
use vitrine_core::ProductRecord;

// ============================================================================
// Configuration
// ============================================================================

/// How `hybrid_search` treats candidates that lack the raw embeddings needed
/// for alpha-consistent re-scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridFallback {
    /// Score against the vector the candidate was indexed under.
    #[default]
    IndexedVector,
    /// Drop the candidate.
    Skip,
}

/// Vector store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Embedding dimension of indexed vectors.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Raw neighbours fetched per requested result in `search`.
    #[serde(default = "default_overfetch")]
    pub overfetch_factor: usize,

    /// Raw neighbours fetched per requested result in `hybrid_search`.
    #[serde(default = "default_hybrid_factor")]
    pub hybrid_factor: usize,

    /// Minimum candidate pool for `hybrid_search`.
    #[serde(default = "default_hybrid_min_pool")]
    pub hybrid_min_pool: usize,

    /// Treatment of candidates without raw embeddings.
    #[serde(default)]
    pub hybrid_fallback: HybridFallback,

    /// Tombstone ratio above which the store reports `NeedsRebuild`.
    #[serde(default = "default_rebuild_threshold")]
    pub rebuild_threshold: f32,
}

fn default_dimension() -> usize {
    512
}

fn default_overfetch() -> usize {
    3
}

fn default_hybrid_factor() -> usize {
    5
}

fn default_hybrid_min_pool() -> usize {
    50
}

fn default_rebuild_threshold() -> f32 {
    0.25
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            overfetch_factor: default_overfetch(),
            hybrid_factor: default_hybrid_factor(),
            hybrid_min_pool: default_hybrid_min_pool(),
            hybrid_fallback: HybridFallback::default(),
            rebuild_threshold: default_rebuild_threshold(),
        }
    }
}

impl VectorConfig {
    /// Default configuration with a specific dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Post-retrieval filters applied by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Allowed categories (empty means any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    /// Inclusive lower price bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,

    /// Inclusive upper price bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,

    /// Minimum similarity score in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

impl SearchFilters {
    /// No filtering.
    pub fn none() -> Self {
        Self::default()
    }

    /// Restrict to a category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Set the price range.
    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.price_min = min;
        self.price_max = max;
        self
    }

    /// Set the minimum score.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Whether a record passes the category and price filters.
    pub fn matches(&self, record: &ProductRecord) -> bool {
        if !self.categories.is_empty() && !self.categories.iter().any(|c| *c == record.category) {
            return false;
        }
        if self.price_min.is_some_and(|min| record.price < min) {
            return false;
        }
        if self.price_max.is_some_and(|max| record.price > max) {
            return false;
        }
        true
    }

    /// Whether a score passes the minimum score filter.
    pub fn accepts_score(&self, score: f32) -> bool {
        self.min_score.is_none_or(|min| score >= min)
    }
}

// ============================================================================
// Candidates
// ============================================================================

/// A retrieval candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// The product (including raw embeddings).
    pub record: ProductRecord,

    /// Similarity score in [0, 1].
    pub score: f32,

    /// Index position of the candidate.
    pub position: usize,

    /// Whether the score was recomputed from raw embeddings.
    #[serde(default)]
    pub rescored: bool,
}

// ============================================================================
// Statistics
// ============================================================================

/// Coarse operational health of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No live products.
    Empty,
    /// Serving normally.
    Healthy,
    /// Too many tombstoned slots; schedule a rebuild.
    NeedsRebuild,
}

/// Store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreStats {
    /// Live (non-tombstoned) products.
    pub total_products: usize,

    /// Vectors held by the index, including stale ones.
    pub indexed_vectors: usize,

    /// Tombstoned slots awaiting rebuild.
    pub tombstoned: usize,

    /// Configured dimension.
    pub dimension: usize,

    /// Estimated index size in bytes.
    pub estimated_bytes: usize,

    /// Index backend name.
    pub backend: String,

    /// Health classification.
    pub health: HealthStatus,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(category: &str, price: f64) -> ProductRecord {
        ProductRecord::new("p", "t")
            .with_category(category)
            .with_price(price)
    }

    #[test]
    fn test_vector_config_default() {
        let config = VectorConfig::default();
        assert_eq!(config.dimension, 512);
        assert_eq!(config.overfetch_factor, 3);
        assert_eq!(config.hybrid_factor, 5);
        assert_eq!(config.hybrid_min_pool, 50);
        assert_eq!(config.hybrid_fallback, HybridFallback::IndexedVector);
    }

    #[test]
    fn test_vector_config_deserialization_with_defaults() {
        let config: VectorConfig =
            serde_json::from_str(r#"{"dimension": 8, "hybrid_fallback": "skip"}"#).unwrap();
        assert_eq!(config.dimension, 8);
        assert_eq!(config.hybrid_fallback, HybridFallback::Skip);
        assert_eq!(config.overfetch_factor, 3);
    }

    #[test]
    fn test_filters_empty_matches_everything() {
        assert!(SearchFilters::none().matches(&product("Tops", 10.0)));
        assert!(SearchFilters::none().accepts_score(0.0));
    }

    #[test]
    fn test_filters_category_and_price() {
        let filters = SearchFilters::none()
            .with_category("Tops")
            .with_price_range(Some(20.0), Some(50.0));

        assert!(filters.matches(&product("Tops", 29.99)));
        assert!(filters.matches(&product("Tops", 50.0)));
        assert!(!filters.matches(&product("Shoes", 29.99)));
        assert!(!filters.matches(&product("Tops", 19.99)));
        assert!(!filters.matches(&product("Tops", 50.01)));
    }

    #[test]
    fn test_filters_min_score() {
        let filters = SearchFilters::none().with_min_score(0.6);
        assert!(filters.accepts_score(0.6));
        assert!(!filters.accepts_score(0.59));
    }

    #[test]
    fn test_filters_serialization_skips_empty() {
        let json = serde_json::to_string(&SearchFilters::none()).unwrap();
        assert_eq!(json, "{}");
    }
}
