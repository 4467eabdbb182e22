//! Ranked results and response metadata.

use serde::{Deserialize, Serialize};
use vitrine_core::{Modality, ProductRecord};

use crate::boost::{AppliedBoost, RelevanceFlag};
use crate::fusion::{FusionMethod, MatchScores};

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// The product, without raw embeddings.
    pub product: ProductRecord,

    /// Retrieval similarity in [0, 1].
    pub base_score: f32,

    /// Boosts applied to the base score.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boosts: Vec<AppliedBoost>,

    /// Why the relevance adjustment moved the score, if it did.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relevance_flags: Vec<RelevanceFlag>,

    /// Score after boosts and diversity.
    pub final_score: f32,

    /// 1-based rank.
    pub rank: usize,

    /// Match tags, e.g. `"title-match"`.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Human-readable explanation.
    #[serde(default)]
    pub explanation: String,
}

/// Wall-clock time spent per pipeline stage, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    /// Embedding resolution (cache and encoder).
    pub encode_ms: f64,
    /// Fusion.
    pub fuse_ms: f64,
    /// Candidate retrieval.
    pub retrieve_ms: f64,
    /// Boosts, dedup, diversity and final ordering.
    pub rank_ms: f64,
    /// Whole request.
    pub total_ms: f64,
}

/// Response-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Whether the response came from the result cache.
    pub cache_hit: bool,

    /// Candidates retrieved before ranking.
    pub total_candidates: usize,

    /// Results returned.
    pub returned: usize,

    /// Requested image weight.
    pub image_weight: f32,

    /// Requested text weight.
    pub text_weight: f32,

    /// Normalised image share actually used.
    pub alpha: f32,

    /// Fusion method used.
    pub fusion_method: FusionMethod,

    /// Fusion diagnostics.
    pub match_scores: MatchScores,

    /// Modalities whose query embedding came from the embedding cache.
    #[serde(default)]
    pub embeddings_cached: Vec<Modality>,

    /// Per-stage timings.
    #[serde(default)]
    pub timings: StageTimings,
}

/// Results plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Ranked results, best first.
    pub results: Vec<RankedResult>,

    /// Response metadata.
    pub metadata: SearchMetadata,
}

impl SearchResponse {
    /// Result ids in rank order.
    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.product.id.as_str()).collect()
    }

    /// Whether nothing was found.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
