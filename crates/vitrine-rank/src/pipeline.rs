//! The hybrid retrieval and ranking pipeline.
//!
//! Every request walks the same stages:
//!
//! ```text
//! Validate -> ResolveEmbeddings -> Fuse -> CacheLookup (hit: return)
//!          -> Retrieve -> Boost -> Dedup -> DiversityRerank -> CacheWrite
//! ```
//!
//! The pipeline holds no per-request state. The store is read-locked only
//! around retrieval, never across an `.await`.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use vitrine_cache::{CacheManager, CacheNamespace, all_pattern};
use vitrine_core::vector::normalized;
use vitrine_core::{Error, ImageData, Modality, ProductRecord, Result};
use vitrine_vector::{Candidate, EmbeddingEncoder, SearchFilters, SharedStore};

use crate::boost::{
    AppliedBoost, BoostContext, BoostHook, ContextBoost, KeywordMatchBoost, RelevanceAdjustment,
    RelevanceFlag, VisualMatchBoost, clamp_factor, combined_factor,
};
use crate::dedup::{Deduplicator, ImageHash};
use crate::explain::{explanation, match_tags};
use crate::fusion::{FusionEngine, FusionMethod, MatchScores};
use crate::query::{MAX_TOP_K, SearchQuery, normalize_query_text, preprocess_text};
use crate::types::{RankedResult, SearchMetadata, SearchResponse, StageTimings};

// ============================================================================
// Configuration
// ============================================================================

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Candidates retrieved per requested result.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Install the keyword, visual, context and relevance hooks.
    #[serde(default = "default_builtin_boosts")]
    pub builtin_boosts: bool,
}

fn default_candidate_multiplier() -> usize {
    2
}

fn default_builtin_boosts() -> bool {
    true
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            candidate_multiplier: default_candidate_multiplier(),
            builtin_boosts: default_builtin_boosts(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Query embedding plus where it came from.
struct Resolved {
    embedding: Vec<f32>,
    cached: bool,
}

/// A candidate on its way to becoming a [`RankedResult`].
struct Scored {
    candidate: Candidate,
    boosts: Vec<AppliedBoost>,
    flags: Vec<RelevanceFlag>,
    score: f32,
}

/// Cross-modal search over a shared [`VectorStore`](vitrine_vector::VectorStore).
pub struct RankingPipeline {
    store: SharedStore,
    encoder: Arc<dyn EmbeddingEncoder>,
    cache: CacheManager,
    fusion: FusionEngine,
    dedup: Deduplicator,
    hooks: Vec<Arc<dyn BoostHook>>,
    config: RankingConfig,
}

impl std::fmt::Debug for RankingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RankingPipeline")
            .field("encoder", &self.encoder.name())
            .field("cache", &self.cache.backend_name())
            .field("hooks", &self.hook_names())
            .field("config", &self.config)
            .finish()
    }
}

impl RankingPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        store: SharedStore,
        encoder: Arc<dyn EmbeddingEncoder>,
        cache: CacheManager,
        config: RankingConfig,
    ) -> Self {
        let hooks: Vec<Arc<dyn BoostHook>> = if config.builtin_boosts {
            vec![
                Arc::new(KeywordMatchBoost),
                Arc::new(VisualMatchBoost),
                Arc::new(ContextBoost),
                Arc::new(RelevanceAdjustment),
            ]
        } else {
            Vec::new()
        };
        Self {
            store,
            encoder,
            cache,
            fusion: FusionEngine::new(),
            dedup: Deduplicator::new(),
            hooks,
            config,
        }
    }

    /// Append a boost hook.
    pub fn with_hook(mut self, hook: Arc<dyn BoostHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// The shared store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// The query and catalog encoder.
    pub fn encoder(&self) -> &Arc<dyn EmbeddingEncoder> {
        &self.encoder
    }

    /// The cache manager.
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Names of the installed hooks, in application order.
    pub fn hook_names(&self) -> Vec<String> {
        self.hooks.iter().map(|h| h.name().to_string()).collect()
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// Run a search.
    ///
    /// # Errors
    ///
    /// - `InvalidQuery` for malformed queries, before any work is done
    /// - `EncoderFailure` when a query embedding cannot be computed
    /// - `DimensionMismatch` when an embedding or fused vector does not fit
    ///   the store
    ///
    /// Cache problems are never reported; an empty store yields an empty
    /// response.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let started = Instant::now();
        let mut timings = StageTimings::default();

        query.validate()?;
        let active = query.active_modalities();
        let alpha = query.effective_alpha();
        let text = query
            .text_query()
            .filter(|_| active.contains(&Modality::Text));
        let image = query
            .image_query()
            .filter(|_| active.contains(&Modality::Image));

        // Resolve embeddings
        let stage = Instant::now();
        let processed = text.map(preprocess_text);
        let (text_embedding, image_embedding) = futures::try_join!(
            self.resolve_text(processed.as_deref()),
            self.resolve_image(image),
        )?;
        let embeddings_cached: Vec<Modality> = [
            (Modality::Image, &image_embedding),
            (Modality::Text, &text_embedding),
        ]
        .into_iter()
        .filter(|(_, resolved)| resolved.as_ref().is_some_and(|r| r.cached))
        .map(|(modality, _)| modality)
        .collect();
        timings.encode_ms = elapsed_ms(stage);

        let text_vec = text_embedding.as_ref().map(|r| r.embedding.as_slice());
        let image_vec = image_embedding.as_ref().map(|r| r.embedding.as_slice());

        // Fuse
        let stage = Instant::now();
        let (fused, match_scores) = self.fusion.fuse(image_vec, text_vec, alpha, query.method)?;
        timings.fuse_ms = elapsed_ms(stage);

        // Cache lookup
        let cache_key = if query.use_cache {
            Some(query.fingerprint()?)
        } else {
            None
        };
        if let Some(key) = &cache_key
            && let Some(mut cached) = self.cache.get::<SearchResponse>(key).await
        {
            cached.metadata.cache_hit = true;
            cached.metadata.embeddings_cached = embeddings_cached;
            timings.total_ms = elapsed_ms(started);
            cached.metadata.timings = timings;
            log::debug!("Search served from cache ({} results)", cached.results.len());
            return Ok(cached);
        }

        // Retrieve
        let stage = Instant::now();
        let pool = query.top_k * self.config.candidate_multiplier.max(1);
        let candidates = {
            let store = self.store.read();
            if query.method == FusionMethod::WeightedAvg || active.len() == 1 {
                store.hybrid_search(text_vec, image_vec, alpha, pool, &query.filters)?
            } else {
                if fused.len() != store.dimension() {
                    return Err(Error::dimension(store.dimension(), fused.len()));
                }
                store.search(&fused, pool, &query.filters)?
            }
        };
        let total_candidates = candidates.len();
        timings.retrieve_ms = elapsed_ms(stage);

        // Rank
        let stage = Instant::now();
        let ranking_text = text.map(normalize_query_text);
        let boost_ctx = BoostContext {
            text: ranking_text.as_deref(),
            has_image: image.is_some(),
            context: query.context.as_ref(),
        };
        let results = self
            .rank(candidates, query, &boost_ctx, &match_scores)
            .await?;
        timings.rank_ms = elapsed_ms(stage);
        timings.total_ms = elapsed_ms(started);

        let response = SearchResponse {
            metadata: SearchMetadata {
                cache_hit: false,
                total_candidates,
                returned: results.len(),
                image_weight: query.image_weight,
                text_weight: query.text_weight,
                alpha,
                fusion_method: query.method,
                match_scores,
                embeddings_cached,
                timings,
            },
            results,
        };

        if let Some(key) = &cache_key
            && total_candidates > 0
        {
            self.cache
                .set(key, &response, self.cache.ttl_for(CacheNamespace::Search))
                .await;
        }

        log::info!(
            "Search returned {} of {} candidates in {:.1}ms",
            response.metadata.returned,
            total_candidates,
            timings.total_ms
        );
        Ok(response)
    }

    /// Boost, deduplicate, diversify, order and annotate candidates.
    async fn rank(
        &self,
        candidates: Vec<Candidate>,
        query: &SearchQuery,
        ctx: &BoostContext<'_>,
        match_scores: &MatchScores,
    ) -> Result<Vec<RankedResult>> {
        let mut scored: Vec<Scored> =
            join_all(candidates.into_iter().map(|c| self.apply_boosts(c, ctx))).await;
        sort_descending(&mut scored);

        let hashes: Vec<Option<ImageHash>> = scored
            .iter()
            .map(|s| {
                s.candidate
                    .record
                    .image_hash
                    .as_deref()
                    .and_then(|h| h.parse().ok())
            })
            .collect();
        let mut scored = self.dedup.deduplicate(scored, &hashes)?;

        let scores: Vec<f32> = scored.iter().map(|s| s.score).collect();
        let categories: Vec<&str> = scored
            .iter()
            .map(|s| s.candidate.record.category.as_str())
            .collect();
        let diversified =
            self.fusion
                .rerank_with_diversity(&scores, &categories, query.diversity_weight)?;
        for (s, score) in scored.iter_mut().zip(diversified) {
            s.score = score;
        }
        sort_descending(&mut scored);
        scored.truncate(query.top_k);

        let results = scored
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let mut product = s.candidate.record;
                product.text_embedding = None;
                product.image_embedding = None;
                RankedResult {
                    tags: match_tags(&product, ctx.text, s.score),
                    explanation: explanation(
                        &product,
                        ctx.text,
                        ctx.has_image,
                        s.score,
                        match_scores,
                    ),
                    product,
                    base_score: s.candidate.score,
                    boosts: s.boosts,
                    relevance_flags: s.flags,
                    final_score: s.score,
                    rank: i + 1,
                }
            })
            .collect();
        Ok(results)
    }

    async fn apply_boosts(&self, candidate: Candidate, ctx: &BoostContext<'_>) -> Scored {
        let mut boosts = Vec::with_capacity(self.hooks.len());
        let mut flags = Vec::new();
        for hook in &self.hooks {
            match hook.factor(&candidate.record, candidate.score, ctx).await {
                Ok(factor) => {
                    flags.extend(hook.flags(&candidate.record, candidate.score, ctx));
                    let factor = clamp_factor(factor);
                    if factor != 1.0 {
                        boosts.push(AppliedBoost {
                            class: hook.class(),
                            factor,
                        });
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Boost hook {} failed for {}: {e}",
                        hook.name(),
                        candidate.record.id
                    );
                }
            }
        }
        let score = candidate.score * combined_factor(&boosts);
        Scored {
            candidate,
            boosts,
            flags,
            score,
        }
    }

    // ------------------------------------------------------------------------
    // Embeddings
    // ------------------------------------------------------------------------

    async fn resolve_text(&self, text: Option<&str>) -> Result<Option<Resolved>> {
        let Some(text) = text else {
            return Ok(None);
        };
        let dimension = self.store.read().dimension();
        if let Some(embedding) = self.cached_embedding(Modality::Text, text.as_bytes(), dimension).await {
            return Ok(Some(Resolved {
                embedding,
                cached: true,
            }));
        }

        let raw = self.encoder.encode_text(text).await?;
        let embedding = checked_embedding(&raw, dimension)?;
        self.cache
            .set_embedding(Modality::Text, text.as_bytes(), &embedding)
            .await;
        Ok(Some(Resolved {
            embedding,
            cached: false,
        }))
    }

    async fn resolve_image(&self, image: Option<&ImageData>) -> Result<Option<Resolved>> {
        let Some(image) = image else {
            return Ok(None);
        };
        let dimension = self.store.read().dimension();
        if let Some(embedding) = self.cached_embedding(Modality::Image, image.bytes(), dimension).await {
            return Ok(Some(Resolved {
                embedding,
                cached: true,
            }));
        }

        let raw = self.encoder.encode_image(image).await?;
        let embedding = checked_embedding(&raw, dimension)?;
        self.cache
            .set_embedding(Modality::Image, image.bytes(), &embedding)
            .await;
        Ok(Some(Resolved {
            embedding,
            cached: false,
        }))
    }

    async fn cached_embedding(
        &self,
        modality: Modality,
        material: &[u8],
        dimension: usize,
    ) -> Option<Vec<f32>> {
        let embedding = self.cache.get_embedding(modality, material).await?;
        if embedding.len() != dimension {
            log::warn!(
                "Ignoring cached {modality} embedding of dimension {} (expected {dimension})",
                embedding.len()
            );
            return None;
        }
        Some(embedding)
    }

    // ------------------------------------------------------------------------
    // Lookups and administration
    // ------------------------------------------------------------------------

    /// A product by id, through the product cache. Raw embeddings are not
    /// included.
    pub async fn product(&self, id: &str) -> Result<ProductRecord> {
        if let Some(product) = self
            .cache
            .get_in::<ProductRecord>(CacheNamespace::Product, id)
            .await
        {
            return Ok(product);
        }
        let product = self.store.read().get_by_id(id)?.without_embeddings();
        self.cache
            .set_in(CacheNamespace::Product, id, &product)
            .await;
        Ok(product)
    }

    /// The `k` products nearest to a stored product, excluding itself.
    pub fn similar_products(&self, id: &str, k: usize) -> Result<Vec<RankedResult>> {
        if !(1..=MAX_TOP_K).contains(&k) {
            return Err(Error::invalid_query(format!(
                "k must be within 1..={MAX_TOP_K}, got {k}"
            )));
        }
        let candidates = self.store.read().similar_to(id, k, &SearchFilters::none())?;
        let results = candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                let product = c.record.without_embeddings();
                RankedResult {
                    tags: match_tags(&product, None, c.score),
                    explanation: explanation(&product, None, false, c.score, &MatchScores::default()),
                    product,
                    base_score: c.score,
                    boosts: Vec::new(),
                    relevance_flags: Vec::new(),
                    final_score: c.score,
                    rank: i + 1,
                }
            })
            .collect();
        Ok(results)
    }

    /// Drop cached entries of one namespace, or of all namespaces.
    pub async fn invalidate_cache(&self, namespace: Option<CacheNamespace>) -> usize {
        match namespace {
            Some(namespace) => self.cache.invalidate_namespace(namespace).await,
            None => self.cache.invalidate(&all_pattern()).await,
        }
    }
}

/// Normalise an encoder output and check it fits the store.
fn checked_embedding(raw: &[f32], dimension: usize) -> Result<Vec<f32>> {
    if raw.len() != dimension {
        return Err(Error::dimension(dimension, raw.len()));
    }
    normalized(raw)
}

/// Stable sort, best first; ties keep their order.
fn sort_descending(scored: &mut [Scored]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

// ============================================================================
// Tests
// ============================================================================
