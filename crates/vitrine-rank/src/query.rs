//! Search queries: defaults, validation, text preprocessing, fingerprints.
//!
//! A [`SearchQuery`] carries everything a caller can ask for. Before any
//! work is done it is validated; the text side is then normalised with
//! [`preprocess_text`] so that cache keys and encoder input agree.

use serde::{Deserialize, Serialize};
use vitrine_cache::{CacheNamespace, cache_key};
use vitrine_core::{Error, ImageData, Modality, Result};
use vitrine_vector::SearchFilters;

use crate::fusion::FusionMethod;

/// Largest accepted `top_k`.
pub const MAX_TOP_K: usize = 100;

// ============================================================================
// QueryContext
// ============================================================================

/// Situational context, passed through to boost hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryContext {
    /// Occasion, e.g. "wedding".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occasion: Option<String>,

    /// Mood, e.g. "relaxed".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,

    /// Season, e.g. "summer".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
}

impl QueryContext {
    /// Context with an occasion.
    pub fn occasion(occasion: impl Into<String>) -> Self {
        Self {
            occasion: Some(occasion.into()),
            ..Self::default()
        }
    }

    /// Set the mood.
    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    /// Set the season.
    pub fn with_season(mut self, season: impl Into<String>) -> Self {
        self.season = Some(season.into());
        self
    }

    /// Lowercased, non-empty context terms.
    pub fn terms(&self) -> Vec<String> {
        [&self.occasion, &self.mood, &self.season]
            .into_iter()
            .flatten()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    /// Whether no term is set.
    pub fn is_empty(&self) -> bool {
        self.terms().is_empty()
    }
}

// ============================================================================
// SearchQuery
// ============================================================================

/// A cross-modal search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    /// Free-text query.
    pub text: Option<String>,

    /// Query image bytes.
    pub image: Option<ImageData>,

    /// Weight of the image side, in [0, 1].
    pub image_weight: f32,

    /// Weight of the text side, in [0, 1].
    pub text_weight: f32,

    /// Number of results, 1..=100.
    pub top_k: usize,

    /// Fusion method for two-modality queries.
    pub method: FusionMethod,

    /// Category, price and score filters.
    pub filters: SearchFilters,

    /// Category diversity penalty, in [0, 1].
    pub diversity_weight: f32,

    /// Context for boost hooks.
    pub context: Option<QueryContext>,

    /// Whether to read and write the result cache.
    pub use_cache: bool,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: None,
            image: None,
            image_weight: 0.7,
            text_weight: 0.3,
            top_k: 10,
            method: FusionMethod::default(),
            filters: SearchFilters::default(),
            diversity_weight: 0.0,
            context: None,
            use_cache: true,
        }
    }
}

impl SearchQuery {
    /// Text-only query.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Image-only query.
    pub fn image(image: ImageData) -> Self {
        Self {
            image: Some(image),
            ..Self::default()
        }
    }

    /// Add (or replace) the text side.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Add (or replace) the image side.
    pub fn with_image(mut self, image: ImageData) -> Self {
        self.image = Some(image);
        self
    }

    /// Set both modality weights.
    pub fn with_weights(mut self, image_weight: f32, text_weight: f32) -> Self {
        self.image_weight = image_weight;
        self.text_weight = text_weight;
        self
    }

    /// Set the number of results.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the fusion method.
    pub fn with_method(mut self, method: FusionMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the filters.
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Set the diversity weight.
    pub fn with_diversity(mut self, diversity_weight: f32) -> Self {
        self.diversity_weight = diversity_weight;
        self
    }

    /// Set the boost context.
    pub fn with_context(mut self, context: QueryContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Enable or disable the result cache.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Query text, if any non-blank text was given.
    pub fn text_query(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Query image, if any non-empty image was given.
    pub fn image_query(&self) -> Option<&ImageData> {
        self.image.as_ref().filter(|i| !i.is_empty())
    }

    /// Reject malformed queries.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` when there is no modality, a weight is outside [0, 1],
    /// both weights are zero, `top_k` is outside 1..=100, or the diversity
    /// weight is outside [0, 1].
    pub fn validate(&self) -> Result<()> {
        if self.text_query().is_none() && self.image_query().is_none() {
            return Err(Error::invalid_query(
                "at least one of text or image is required",
            ));
        }
        for (name, weight) in [
            ("image_weight", self.image_weight),
            ("text_weight", self.text_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::invalid_query(format!(
                    "{name} must be within [0, 1], got {weight}"
                )));
            }
        }
        if self.image_weight + self.text_weight <= 0.0 {
            return Err(Error::invalid_query(
                "image_weight and text_weight cannot both be zero",
            ));
        }
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(Error::invalid_query(format!(
                "top_k must be within 1..={MAX_TOP_K}, got {}",
                self.top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.diversity_weight) {
            return Err(Error::invalid_query(format!(
                "diversity_weight must be within [0, 1], got {}",
                self.diversity_weight
            )));
        }
        Ok(())
    }

    /// `image_weight / (image_weight + text_weight)`.
    ///
    /// Only meaningful after [`validate`](Self::validate).
    pub fn alpha(&self) -> f32 {
        let total = self.image_weight + self.text_weight;
        if total <= 0.0 {
            return 0.5;
        }
        self.image_weight / total
    }

    /// Modalities that take part in retrieval.
    ///
    /// A supplied modality whose weight is zero is dropped while the other
    /// one is present.
    pub fn active_modalities(&self) -> Vec<Modality> {
        let has_text = self.text_query().is_some();
        let has_image = self.image_query().is_some();
        let mut active = Vec::with_capacity(2);
        if has_image && (self.image_weight > 0.0 || !has_text) {
            active.push(Modality::Image);
        }
        if has_text && (self.text_weight > 0.0 || !has_image) {
            active.push(Modality::Text);
        }
        active
    }

    /// Alpha after dropping inactive modalities: 1 for image-only, 0 for
    /// text-only, [`alpha`](Self::alpha) otherwise.
    pub fn effective_alpha(&self) -> f32 {
        match self.active_modalities().as_slice() {
            [Modality::Image] => 1.0,
            [Modality::Text] => 0.0,
            _ => self.alpha(),
        }
    }

    /// Result-cache key for this query.
    ///
    /// Two queries share a key only if they are answered identically: the
    /// key covers the encoded (preprocessed) text, the ranking text the
    /// boosts and tags read, the image content hash, the effective alpha,
    /// method, filters, `top_k`, diversity and context.
    pub fn fingerprint(&self) -> Result<String> {
        let active = self.active_modalities();
        let text = self
            .text_query()
            .filter(|_| active.contains(&Modality::Text));
        let shape = QueryShape {
            text: text.map(preprocess_text),
            ranking_text: text.map(normalize_query_text),
            image: self
                .image_query()
                .filter(|_| active.contains(&Modality::Image))
                .map(ImageData::content_hash),
            alpha: format!("{:.4}", self.effective_alpha()),
            method: self.method,
            filters: &self.filters,
            top_k: self.top_k,
            diversity_weight: format!("{:.4}", self.diversity_weight),
            context: self.context.as_ref().filter(|c| !c.is_empty()),
        };
        let material = serde_json::to_vec(&shape)?;
        Ok(cache_key(CacheNamespace::Search, material))
    }
}

#[derive(Serialize)]
struct QueryShape<'a> {
    text: Option<String>,
    ranking_text: Option<String>,
    image: Option<String>,
    alpha: String,
    method: FusionMethod,
    filters: &'a SearchFilters,
    top_k: usize,
    diversity_weight: String,
    context: Option<&'a QueryContext>,
}

// ============================================================================
// Text preprocessing
// ============================================================================

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("tshirt", "t-shirt"),
    ("jkt", "jacket"),
    ("pant", "pants"),
    ("sunglass", "sunglasses"),
    ("watches", "watch"),
    ("shoes", "shoe"),
    ("bags", "bag"),
    ("jewellery", "jewelry"),
    ("jewlery", "jewelry"),
];

const SINGLE_WORD_CONTEXT: &[(&str, &str)] = &[
    ("watch", "a wrist watch"),
    ("bag", "a handbag or backpack"),
    ("shoe", "a pair of shoes"),
    ("dress", "a women's dress"),
    ("shirt", "a shirt or top"),
    ("jacket", "a jacket or coat"),
    ("ring", "a ring or jewelry"),
    ("bracelet", "a bracelet or jewelry"),
    ("necklace", "a necklace or jewelry"),
    ("sunglasses", "sunglasses or eyewear"),
];

/// Lowercase and collapse whitespace, without expanding shorthand.
///
/// This is the text that boosts, match tags and explanations read.
pub fn normalize_query_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalise query text before encoding.
///
/// Lowercases, collapses whitespace and expands common catalog shorthand
/// word by word (`"t shirt"` and `"tshirt"` both become `"t-shirt"`). A
/// single-word query naming a known product type is replaced by a short
/// descriptive phrase (`"watch"` becomes `"a wrist watch"`).
pub fn preprocess_text(text: &str) -> String {
    let lowered = normalize_query_text(text);
    let words: Vec<&str> = lowered.split_whitespace().collect();

    let mut expanded: Vec<&str> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        if words[i] == "t" && words.get(i + 1) == Some(&"shirt") {
            expanded.push("t-shirt");
            i += 2;
            continue;
        }
        let word = ABBREVIATIONS
            .iter()
            .find(|(short, _)| *short == words[i])
            .map_or(words[i], |(_, full)| *full);
        expanded.push(word);
        i += 1;
    }

    if let [only] = expanded.as_slice()
        && let Some((_, phrase)) = SINGLE_WORD_CONTEXT.iter().find(|(word, _)| word == only)
    {
        return (*phrase).to_string();
    }
    expanded.join(" ")
}

// ============================================================================
// Tests
// ============================================================================
