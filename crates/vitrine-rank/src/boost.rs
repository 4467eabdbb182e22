//! Multiplicative score boosts.
//!
//! Each [`BoostHook`] looks at one candidate and returns a factor for its
//! [`BoostClass`]. Factors are clamped to `[0, BOOST_CEILING]` and their
//! product is clamped again, so no combination of hooks can lift a score by
//! more than [`BOOST_CEILING`].
//!
//! Sentiment and occasion models live outside this crate and plug in
//! through the same trait. The built-in hooks cover keyword, visual and
//! context matching, plus a per-modality relevance adjustment that also
//! raises [`RelevanceFlag`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use vitrine_core::{ProductRecord, Result};

use crate::query::QueryContext;

/// Upper bound on any single factor and on the combined boost.
pub const BOOST_CEILING: f32 = 2.0;

/// Keywords of this many characters or fewer are ignored.
const SHORT_KEYWORD_LEN: usize = 2;

// ============================================================================
// Types
// ============================================================================

/// Kind of signal a boost is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostClass {
    /// Review sentiment.
    Sentiment,
    /// Occasion, mood or season fit.
    Occasion,
    /// Query keywords found in the product text.
    TextMatch,
    /// Confidence in a visual match.
    Visual,
    /// Agreement between the query modalities and the product text.
    Relevance,
}

impl BoostClass {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment",
            Self::Occasion => "occasion",
            Self::TextMatch => "text_match",
            Self::Visual => "visual",
            Self::Relevance => "relevance",
        }
    }
}

impl fmt::Display for BoostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A boost that was applied to a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedBoost {
    /// Signal class.
    pub class: BoostClass,
    /// Clamped factor.
    pub factor: f32,
}

/// Why a result's relevance was adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceFlag {
    /// Text and image query with no keyword in the product text.
    LowTextMatch,
    /// Few or no keywords found.
    WeakTextMatch,
    /// Text and image query with good keyword coverage.
    StrongMultimodalMatch,
    /// Text-only query with a keyword in the title or better.
    StrongTextMatch,
    /// Text and image query with low similarity.
    LowVisualMatch,
    /// Image-only query with high similarity.
    StrongVisualMatch,
    /// Image-only query with low similarity.
    WeakVisualMatch,
}

/// What a hook may look at besides the candidate.
#[derive(Debug, Clone, Copy)]
pub struct BoostContext<'a> {
    /// The query text, lowercased with whitespace collapsed.
    pub text: Option<&'a str>,
    /// Whether an image took part in retrieval.
    pub has_image: bool,
    /// Situational context from the query.
    pub context: Option<&'a QueryContext>,
}

impl BoostContext<'_> {
    /// Whether text took part in retrieval.
    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }

    /// Distinct lowercase query words longer than two characters, in order.
    pub fn keywords(&self) -> Vec<String> {
        let Some(text) = self.text else {
            return Vec::new();
        };
        let mut keywords: Vec<String> = Vec::new();
        for word in text.to_lowercase().split_whitespace() {
            if word.chars().count() > SHORT_KEYWORD_LEN && !keywords.iter().any(|k| k == word) {
                keywords.push(word.to_string());
            }
        }
        keywords
    }
}

/// A pluggable ranking signal.
#[async_trait]
pub trait BoostHook: Send + Sync {
    /// Hook name, for logs.
    fn name(&self) -> &str;

    /// Class of the returned factor.
    fn class(&self) -> BoostClass;

    /// Multiplicative factor for a candidate. `1.0` leaves it unchanged.
    ///
    /// `base_score` is the retrieval similarity in [0, 1].
    async fn factor(
        &self,
        product: &ProductRecord,
        base_score: f32,
        ctx: &BoostContext<'_>,
    ) -> Result<f32>;

    /// Relevance flags for a candidate. Most hooks raise none.
    fn flags(
        &self,
        _product: &ProductRecord,
        _base_score: f32,
        _ctx: &BoostContext<'_>,
    ) -> Vec<RelevanceFlag> {
        Vec::new()
    }
}

/// Clamp a single factor into `[0, BOOST_CEILING]`; non-finite factors
/// become neutral.
pub fn clamp_factor(factor: f32) -> f32 {
    if !factor.is_finite() {
        return 1.0;
    }
    factor.clamp(0.0, BOOST_CEILING)
}

/// Product of the applied factors, clamped into `[0, BOOST_CEILING]`.
pub fn combined_factor(boosts: &[AppliedBoost]) -> f32 {
    boosts
        .iter()
        .map(|b| clamp_factor(b.factor))
        .product::<f32>()
        .clamp(0.0, BOOST_CEILING)
}

// ============================================================================
// Built-in hooks
// ============================================================================

/// Rewards query keywords found in the title (+0.15) or category (+0.10).
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMatchBoost;

#[async_trait]
impl BoostHook for KeywordMatchBoost {
    fn name(&self) -> &str {
        "keyword_match"
    }

    fn class(&self) -> BoostClass {
        BoostClass::TextMatch
    }

    async fn factor(
        &self,
        product: &ProductRecord,
        _base_score: f32,
        ctx: &BoostContext<'_>,
    ) -> Result<f32> {
        let title = product.title.to_lowercase();
        let category = product.category.to_lowercase();

        let mut factor = 1.0;
        for keyword in ctx.keywords() {
            if title.contains(&keyword) {
                factor += 0.15;
            }
            if category.contains(&keyword) {
                factor += 0.10;
            }
        }
        Ok(factor)
    }
}

/// Progressive boost for strong visual matches on image queries.
///
/// | base score | boost |
/// |------------|-------|
/// | > 0.85     | +0.25 |
/// | > 0.75     | +0.20 |
/// | > 0.65     | +0.15 |
/// | > 0.55     | +0.10 |
///
/// Queries that also carry text get a further +0.10 above 0.60.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisualMatchBoost;

#[async_trait]
impl BoostHook for VisualMatchBoost {
    fn name(&self) -> &str {
        "visual_match"
    }

    fn class(&self) -> BoostClass {
        BoostClass::Visual
    }

    async fn factor(
        &self,
        _product: &ProductRecord,
        base_score: f32,
        ctx: &BoostContext<'_>,
    ) -> Result<f32> {
        if !ctx.has_image {
            return Ok(1.0);
        }

        let mut factor = 1.0;
        factor += if base_score > 0.85 {
            0.25
        } else if base_score > 0.75 {
            0.20
        } else if base_score > 0.65 {
            0.15
        } else if base_score > 0.55 {
            0.10
        } else {
            0.0
        };
        if ctx.has_text() && base_score > 0.60 {
            factor += 0.10;
        }
        Ok(factor)
    }
}

/// +0.1 for every context term found in the product's text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBoost;

#[async_trait]
impl BoostHook for ContextBoost {
    fn name(&self) -> &str {
        "context_match"
    }

    fn class(&self) -> BoostClass {
        BoostClass::Occasion
    }

    async fn factor(
        &self,
        product: &ProductRecord,
        _base_score: f32,
        ctx: &BoostContext<'_>,
    ) -> Result<f32> {
        let Some(context) = ctx.context else {
            return Ok(1.0);
        };
        let haystack = format!(
            "{} {} {}",
            product.title,
            product.category,
            product.description.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        let matched = context
            .terms()
            .iter()
            .filter(|term| haystack.contains(term.as_str()))
            .count();
        Ok(1.0 + 0.1 * matched as f32)
    }
}

/// Per-modality relevance adjustment.
///
/// Query keywords score 3 in the title, else 2 in the category, else 1 in
/// the description. Thresholds apply to the base score.
///
/// | query        | condition                     | factor          | flag                      |
/// |--------------|-------------------------------|-----------------|---------------------------|
/// | text + image | no keyword, score < 0.80      | x0.3            | `low_text_match`          |
/// | text + image | keyword score 1               | x0.6            | `weak_text_match`         |
/// | text + image | keyword score 2 or more       | up to x1.3      | `strong_multimodal_match` |
/// | text + image | score < 0.50 (additionally)   | x0.7            | `low_visual_match`        |
/// | text         | keyword score 3 or more       | x1.2            | `strong_text_match`       |
/// | text         | no keyword                    | x0.5            | `weak_text_match`         |
/// | image        | score > 0.70                  | x1.0            | `strong_visual_match`     |
/// | image        | score < 0.40                  | x0.8            | `weak_visual_match`       |
#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceAdjustment;

impl RelevanceAdjustment {
    /// Factor and flags for one candidate.
    pub fn assess(
        product: &ProductRecord,
        base_score: f32,
        ctx: &BoostContext<'_>,
    ) -> (f32, Vec<RelevanceFlag>) {
        let mut factor = 1.0;
        let mut flags = Vec::new();

        match (ctx.has_text(), ctx.has_image) {
            (true, true) => {
                let keywords = ctx.keywords();
                let matched = keyword_match_score(product, &keywords);
                if matched == 0 {
                    if base_score < 0.80 {
                        factor *= 0.3;
                        flags.push(RelevanceFlag::LowTextMatch);
                    }
                } else if matched < 2 {
                    factor *= 0.6;
                    flags.push(RelevanceFlag::WeakTextMatch);
                } else {
                    let ratio = matched as f32 / (keywords.len() * 3).max(1) as f32;
                    factor *= 1.0 + (ratio * 0.3).min(0.3);
                    flags.push(RelevanceFlag::StrongMultimodalMatch);
                }
                if base_score < 0.50 {
                    factor *= 0.7;
                    flags.push(RelevanceFlag::LowVisualMatch);
                }
            }
            (true, false) => {
                let matched = keyword_match_score(product, &ctx.keywords());
                if matched >= 3 {
                    factor *= 1.2;
                    flags.push(RelevanceFlag::StrongTextMatch);
                } else if matched == 0 {
                    factor *= 0.5;
                    flags.push(RelevanceFlag::WeakTextMatch);
                }
            }
            (false, true) => {
                if base_score > 0.70 {
                    flags.push(RelevanceFlag::StrongVisualMatch);
                } else if base_score < 0.40 {
                    factor *= 0.8;
                    flags.push(RelevanceFlag::WeakVisualMatch);
                }
            }
            (false, false) => {}
        }
        (factor, flags)
    }
}

#[async_trait]
impl BoostHook for RelevanceAdjustment {
    fn name(&self) -> &str {
        "relevance"
    }

    fn class(&self) -> BoostClass {
        BoostClass::Relevance
    }

    async fn factor(
        &self,
        product: &ProductRecord,
        base_score: f32,
        ctx: &BoostContext<'_>,
    ) -> Result<f32> {
        Ok(Self::assess(product, base_score, ctx).0)
    }

    fn flags(
        &self,
        product: &ProductRecord,
        base_score: f32,
        ctx: &BoostContext<'_>,
    ) -> Vec<RelevanceFlag> {
        Self::assess(product, base_score, ctx).1
    }
}

/// Keyword evidence: 3 per keyword in the title, else 2 in the category,
/// else 1 in the description.
fn keyword_match_score(product: &ProductRecord, keywords: &[String]) -> usize {
    let title = product.title.to_lowercase();
    let category = product.category.to_lowercase();
    let description = product
        .description
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    keywords
        .iter()
        .map(|keyword| {
            if title.contains(keyword.as_str()) {
                3
            } else if category.contains(keyword.as_str()) {
                2
            } else if description.contains(keyword.as_str()) {
                1
            } else {
                0
            }
        })
        .sum()
}

// ============================================================================
// Tests
// ============================================================================
