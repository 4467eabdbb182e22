//! Handlers for the read-side commands: `search`, `product`, `similar` and
//! `cache`.

use crate::cli::SearchArgs;
use std::str::FromStr;
use vitrine_cache::{CacheNamespace, CacheStats};
use vitrine_core::{Error, ImageData, ProductRecord, Result};
use vitrine_rank::{FusionMethod, QueryContext, RankedResult, RankingPipeline, SearchQuery, SearchResponse};

/// Apply command-line arguments on top of the configured query defaults.
pub fn build_query(base: SearchQuery, args: SearchArgs) -> Result<SearchQuery> {
    let mut query = base;
    query.text = args.text;

    if let Some(path) = &args.image {
        let bytes = std::fs::read(path).map_err(|e| Error::io_with_path(e, path))?;
        query.image = Some(ImageData::new(bytes));
    }
    if let Some(w) = args.image_weight {
        query.image_weight = w;
    }
    if let Some(w) = args.text_weight {
        query.text_weight = w;
    }
    if let Some(k) = args.top_k {
        query.top_k = k;
    }
    if let Some(method) = &args.method {
        query.method = FusionMethod::from_str(method)?;
    }
    if let Some(d) = args.diversity {
        query.diversity_weight = d;
    }

    query.filters.categories = args.categories;
    query.filters.price_min = args.min_price;
    query.filters.price_max = args.max_price;
    query.filters.min_score = args.min_score;

    let context = QueryContext {
        occasion: args.occasion,
        mood: args.mood,
        season: args.season,
    };
    query.context = (!context.is_empty()).then_some(context);
    query.use_cache = !args.no_cache;
    Ok(query)
}

/// Run a search.
pub async fn handle_search(pipeline: &RankingPipeline, query: &SearchQuery) -> Result<SearchResponse> {
    let response = pipeline.search(query).await?;
    log::info!(
        "{} results in {:.1}ms (cache hit: {})",
        response.metadata.returned,
        response.metadata.timings.total_ms,
        response.metadata.cache_hit
    );
    Ok(response)
}

/// Look up one product.
pub async fn handle_product(pipeline: &RankingPipeline, id: &str) -> Result<ProductRecord> {
    pipeline.product(id).await
}

/// Nearest neighbours of a stored product.
pub fn handle_similar(pipeline: &RankingPipeline, id: &str, k: usize) -> Result<Vec<RankedResult>> {
    pipeline.similar_products(id, k)
}

/// Flush one cache namespace, or everything.
pub async fn handle_cache_flush(pipeline: &RankingPipeline, namespace: Option<&str>) -> Result<usize> {
    let namespace = namespace
        .map(|name| {
            CacheNamespace::parse(name).ok_or_else(|| {
                Error::invalid_input(format!(
                    "unknown cache namespace '{name}' (expected text, image, search, or product)"
                ))
            })
        })
        .transpose()?;
    let removed = pipeline.invalidate_cache(namespace).await;
    log::info!("Flushed {removed} cache entries");
    Ok(removed)
}

/// Cache statistics.
pub async fn handle_cache_stats(pipeline: &RankingPipeline) -> CacheStats {
    pipeline.cache().stats().await
}
