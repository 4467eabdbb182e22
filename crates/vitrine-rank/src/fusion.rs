//! Embedding fusion and diversity re-ranking.
//!
//! [`FusionEngine::fuse`] combines an image and a text embedding into one
//! query vector. `alpha` always weights the image side:
//!
//! ```text
//! WeightedAvg    normalize(alpha * image + (1 - alpha) * text)
//! Concatenation  normalize(image ++ text)          (2x dimension)
//! ElementWise    normalize(image ⊙ text)
//! ```
//!
//! A single embedding is passed through unchanged. The accompanying
//! [`MatchScores`] are diagnostic only and feed the result explanations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use vitrine_core::vector::{cosine, normalized, to_unit_interval, weighted_sum};
use vitrine_core::{Error, Result};

/// Lower bound on the per-item diversity factor.
pub const MIN_DIVERSITY_FACTOR: f32 = 0.05;

// ============================================================================
// FusionMethod
// ============================================================================

/// How two modalities are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Alpha-weighted average in the shared space.
    #[default]
    WeightedAvg,
    /// Concatenation of both vectors.
    Concatenation,
    /// Elementwise product.
    ElementWise,
}

impl FusionMethod {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightedAvg => "weighted_avg",
            Self::Concatenation => "concatenation",
            Self::ElementWise => "element_wise",
        }
    }
}

impl fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FusionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weighted_avg" | "weighted_average" => Ok(Self::WeightedAvg),
            "concatenation" | "concat" => Ok(Self::Concatenation),
            "element_wise" | "elementwise" => Ok(Self::ElementWise),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }
}

// ============================================================================
// MatchScores
// ============================================================================

/// Diagnostic scores describing how a query was fused.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MatchScores {
    /// Share of the image side (`alpha`).
    pub image_contribution: f32,

    /// Share of the text side (`1 - alpha`).
    pub text_contribution: f32,

    /// `(cos(image, text) + 1) / 2`; only for two-modality queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_text_alignment: Option<f32>,

    /// How well the fused vector still resembles its inputs, in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion_quality: Option<f32>,
}

impl MatchScores {
    fn unimodal(image: bool) -> Self {
        let image_contribution = if image { 1.0 } else { 0.0 };
        Self {
            image_contribution,
            text_contribution: 1.0 - image_contribution,
            image_text_alignment: None,
            fusion_quality: None,
        }
    }
}

// ============================================================================
// FusionEngine
// ============================================================================

/// Stateless embedding fusion.
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionEngine;

impl FusionEngine {
    /// Create a fusion engine.
    pub fn new() -> Self {
        Self
    }

    /// Fuse the available embeddings.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` when neither embedding is given, `alpha` is outside
    ///   [0, 1], or the fused vector has zero norm
    /// - `DimensionMismatch` when `WeightedAvg` / `ElementWise` inputs differ
    ///   in length
    pub fn fuse(
        &self,
        image: Option<&[f32]>,
        text: Option<&[f32]>,
        alpha: f32,
        method: FusionMethod,
    ) -> Result<(Vec<f32>, MatchScores)> {
        let (image, text) = match (image, text) {
            (None, None) => {
                return Err(Error::invalid_input(
                    "fusion needs at least one embedding",
                ));
            }
            (None, Some(text)) => {
                log::debug!("Text-only fusion");
                return Ok((text.to_vec(), MatchScores::unimodal(false)));
            }
            (Some(image), None) => {
                log::debug!("Image-only fusion");
                return Ok((image.to_vec(), MatchScores::unimodal(true)));
            }
            (Some(image), Some(text)) => (image, text),
        };

        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::invalid_input(format!(
                "alpha must be within [0, 1], got {alpha}"
            )));
        }
        if method != FusionMethod::Concatenation && image.len() != text.len() {
            return Err(Error::dimension(image.len(), text.len()));
        }

        let image = normalized(image)?;
        let text = normalized(text)?;

        let fused = match method {
            FusionMethod::WeightedAvg => weighted_sum(&image, &text, alpha),
            FusionMethod::Concatenation => image.iter().chain(&text).copied().collect(),
            FusionMethod::ElementWise => image.iter().zip(&text).map(|(a, b)| a * b).collect(),
        };
        let fused = normalized(&fused)
            .map_err(|_| Error::invalid_input(format!("{method} fusion produced a zero vector")))?;

        let scores = Self::match_scores(&image, &text, &fused, alpha, method);
        log::debug!("Fusion complete: method={method}, alpha={alpha:.2}");
        Ok((fused, scores))
    }

    fn match_scores(
        image: &[f32],
        text: &[f32],
        fused: &[f32],
        alpha: f32,
        method: FusionMethod,
    ) -> MatchScores {
        let (image_sim, text_sim) = match method {
            FusionMethod::Concatenation => {
                let (head, tail) = fused.split_at(image.len());
                (cosine(head, image), cosine(tail, text))
            }
            _ => (cosine(fused, image), cosine(fused, text)),
        };

        MatchScores {
            image_contribution: alpha,
            text_contribution: 1.0 - alpha,
            image_text_alignment: Some(to_unit_interval(cosine(image, text))),
            fusion_quality: Some(
                ((alpha * image_sim + (1.0 - alpha) * text_sim + 1.0) / 2.0).clamp(0.0, 1.0),
            ),
        }
    }

    /// Penalise repeated categories.
    ///
    /// Walking in input order, the `n`-th earlier occurrence of an item's
    /// category multiplies its score by `max(1 - w * n, MIN_DIVERSITY_FACTOR)`.
    /// A weight of zero returns the scores unchanged.
    pub fn rerank_with_diversity(
        &self,
        scores: &[f32],
        categories: &[&str],
        diversity_weight: f32,
    ) -> Result<Vec<f32>> {
        if scores.len() != categories.len() {
            return Err(Error::invalid_input(format!(
                "{} scores but {} categories",
                scores.len(),
                categories.len()
            )));
        }
        if !(0.0..=1.0).contains(&diversity_weight) {
            return Err(Error::invalid_input(format!(
                "diversity weight must be within [0, 1], got {diversity_weight}"
            )));
        }
        if diversity_weight == 0.0 {
            return Ok(scores.to_vec());
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let reranked = scores
            .iter()
            .zip(categories)
            .map(|(&score, &category)| {
                let earlier = seen.entry(category).or_insert(0);
                let factor = (1.0 - diversity_weight * *earlier as f32).max(MIN_DIVERSITY_FACTOR);
                *earlier += 1;
                score * factor
            })
            .collect();
        Ok(reranked)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vitrine_core::vector::is_unit;

    const ENGINE: FusionEngine = FusionEngine;

    // ---- method parsing ----

    #[test]
    fn test_method_from_str() {
        assert_eq!("weighted_avg".parse::<FusionMethod>().unwrap(), FusionMethod::WeightedAvg);
        assert_eq!("Element-Wise".parse::<FusionMethod>().unwrap(), FusionMethod::ElementWise);
        assert_eq!("concat".parse::<FusionMethod>().unwrap(), FusionMethod::Concatenation);

        let err = "attention".parse::<FusionMethod>().unwrap_err();
        assert!(matches!(err, Error::InvalidMethod(ref m) if m == "attention"));
    }

    #[test]
    fn test_method_serde_names() {
        assert_eq!(
            serde_json::to_string(&FusionMethod::ElementWise).unwrap(),
            "\"element_wise\""
        );
        assert_eq!(FusionMethod::default(), FusionMethod::WeightedAvg);
    }

    // ---- fuse ----

    #[test]
    fn test_fuse_requires_an_embedding() {
        assert!(matches!(
            ENGINE.fuse(None, None, 0.5, FusionMethod::WeightedAvg),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fuse_single_modality_is_identity() {
        let text = [0.6, 0.8];
        let (fused, scores) = ENGINE.fuse(None, Some(&text), 0.7, FusionMethod::ElementWise).unwrap();
        assert_eq!(fused, text.to_vec());
        assert_eq!(scores.text_contribution, 1.0);
        assert_eq!(scores.image_contribution, 0.0);
        assert!(scores.image_text_alignment.is_none());

        let (fused, scores) = ENGINE.fuse(Some(&text), None, 0.2, FusionMethod::WeightedAvg).unwrap();
        assert_eq!(fused, text.to_vec());
        assert_eq!(scores.image_contribution, 1.0);
    }

    #[test]
    fn test_fuse_weighted_average_exact() {
        let image = [1.0, 0.0];
        let text = [0.0, 1.0];
        let (fused, scores) = ENGINE
            .fuse(Some(&image), Some(&text), 0.75, FusionMethod::WeightedAvg)
            .unwrap();

        let expected = normalized(&[0.75, 0.25]).unwrap();
        assert!((fused[0] - expected[0]).abs() < 1e-6);
        assert!((fused[1] - expected[1]).abs() < 1e-6);
        assert_eq!(scores.image_contribution, 0.75);
        assert!((scores.text_contribution - 0.25).abs() < 1e-6);
        assert!((scores.image_text_alignment.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_normalizes_inputs_first() {
        let (a, _) = ENGINE
            .fuse(Some(&[10.0, 0.0]), Some(&[0.0, 1.0]), 0.5, FusionMethod::WeightedAvg)
            .unwrap();
        let (b, _) = ENGINE
            .fuse(Some(&[1.0, 0.0]), Some(&[0.0, 1.0]), 0.5, FusionMethod::WeightedAvg)
            .unwrap();
        assert!((a[0] - b[0]).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_concatenation_doubles_dimension() {
        let (fused, scores) = ENGINE
            .fuse(Some(&[1.0, 0.0]), Some(&[0.0, 1.0, 0.0]), 0.5, FusionMethod::Concatenation)
            .unwrap();
        assert_eq!(fused.len(), 5);
        assert!(is_unit(&fused));
        // Each half is exactly its input direction.
        assert!((scores.fusion_quality.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_element_wise() {
        let (fused, _) = ENGINE
            .fuse(Some(&[0.6, 0.8]), Some(&[0.8, 0.6]), 0.5, FusionMethod::ElementWise)
            .unwrap();
        assert!((fused[0] - fused[1]).abs() < 1e-6);
        assert!(is_unit(&fused));
    }

    #[test]
    fn test_fuse_dimension_mismatch() {
        let err = ENGINE
            .fuse(Some(&[1.0, 0.0]), Some(&[1.0, 0.0, 0.0]), 0.5, FusionMethod::WeightedAvg)
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_fuse_zero_result_is_invalid_input() {
        let err = ENGINE
            .fuse(Some(&[1.0, 0.0]), Some(&[-1.0, 0.0]), 0.5, FusionMethod::WeightedAvg)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = ENGINE
            .fuse(Some(&[1.0, 0.0]), Some(&[0.0, 1.0]), 0.5, FusionMethod::ElementWise)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_fuse_rejects_alpha_out_of_range() {
        assert!(ENGINE
            .fuse(Some(&[1.0]), Some(&[1.0]), 1.5, FusionMethod::WeightedAvg)
            .is_err());
    }

    // ---- diversity ----

    #[test]
    fn test_diversity_zero_is_identity() {
        let scores = [0.9, 0.8, 0.7];
        let reranked = ENGINE
            .rerank_with_diversity(&scores, &["a", "a", "a"], 0.0)
            .unwrap();
        assert_eq!(reranked, scores.to_vec());
    }

    #[test]
    fn test_diversity_penalises_repeats() {
        let reranked = ENGINE
            .rerank_with_diversity(&[1.0, 1.0, 1.0, 1.0], &["a", "b", "a", "a"], 0.25)
            .unwrap();
        assert_eq!(reranked, vec![1.0, 1.0, 0.75, 0.5]);
    }

    #[test]
    fn test_diversity_factor_floor() {
        let reranked = ENGINE
            .rerank_with_diversity(&[1.0, 1.0, 1.0], &["x", "x", "x"], 1.0)
            .unwrap();
        assert_eq!(reranked[1], MIN_DIVERSITY_FACTOR);
        assert_eq!(reranked[2], MIN_DIVERSITY_FACTOR);
        assert!(reranked.iter().all(|&s| s > 0.0));
    }

    #[test]
    fn test_diversity_length_mismatch() {
        assert!(ENGINE.rerank_with_diversity(&[1.0], &[], 0.1).is_err());
    }

    // ---- properties ----

    fn embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
        prop::collection::vec(-1.0f32..1.0f32, dim)
            .prop_filter("non-zero", |v| vitrine_core::vector::l2_norm(v) > 1e-3)
    }

    proptest! {
        #[test]
        fn test_fused_vector_is_unit(
            image in embedding(16),
            text in embedding(16),
            alpha in 0.0f32..=1.0f32,
        ) {
            for method in [FusionMethod::WeightedAvg, FusionMethod::Concatenation, FusionMethod::ElementWise] {
                match ENGINE.fuse(Some(&image), Some(&text), alpha, method) {
                    Ok((fused, scores)) => {
                        prop_assert!(is_unit(&fused), "{method} produced norm {}", vitrine_core::vector::l2_norm(&fused));
                        prop_assert!((scores.image_contribution + scores.text_contribution - 1.0).abs() < 1e-6);
                        let quality = scores.fusion_quality.unwrap();
                        prop_assert!((0.0..=1.0).contains(&quality));
                    }
                    Err(e) => prop_assert!(matches!(e, Error::InvalidInput(_))),
                }
            }
        }

        #[test]
        fn test_diversity_never_increases_scores(
            scores in prop::collection::vec(0.0f32..1.0f32, 1..20),
            weight in 0.0f32..=1.0f32,
        ) {
            let categories: Vec<&str> = scores.iter().enumerate()
                .map(|(i, _)| if i % 3 == 0 { "a" } else { "b" })
                .collect();
            let reranked = ENGINE.rerank_with_diversity(&scores, &categories, weight).unwrap();
            for (before, after) in scores.iter().zip(&reranked) {
                prop_assert!(after <= before);
                prop_assert!(*after >= before * MIN_DIVERSITY_FACTOR - 1e-6);
            }
        }
    }
}
