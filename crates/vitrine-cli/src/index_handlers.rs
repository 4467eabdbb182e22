//! Handlers for the write-side and health commands: `index`, `remove`,
//! `compact`, `stats` and `health`.
//!
//! Every mutation is persisted to the index directory straight away and
//! drops the search and product caches, which may now be stale.

use crate::cli::IndexArgs;
use serde::Serialize;
use std::path::Path;
use vitrine_cache::{CacheNamespace, CacheStats};
use vitrine_catalog::{
    CatalogEntry, IngestOptions, IngestReport, SyntheticFetcher, ingest, load_catalog_file,
    with_images,
};
use vitrine_core::Result;
use vitrine_rank::RankingPipeline;
use vitrine_vector::{HealthStatus, VectorStoreStats};

/// Output of `vitrine stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Vector store statistics.
    pub index: VectorStoreStats,
    /// Cache statistics.
    pub cache: CacheStats,
}

/// Output of `vitrine health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Index health classification.
    pub index: HealthStatus,
    /// Live products.
    pub products: usize,
    /// Encoder in use.
    pub encoder: String,
    /// Cache backend name.
    pub cache_backend: String,
    /// Whether the cache answered a ping.
    pub cache_available: bool,
}

/// Ingest the synthetic catalog or a JSON catalog file.
pub async fn handle_index(
    pipeline: &RankingPipeline,
    index_dir: &Path,
    args: &IndexArgs,
) -> Result<IngestReport> {
    let entries = match &args.file {
        Some(path) => load_catalog_file(path, &args.source)?
            .into_iter()
            .map(CatalogEntry::new)
            .collect(),
        None => {
            let fetcher = SyntheticFetcher::new(args.count);
            with_images(&fetcher, fetcher.products().to_vec()).await
        }
    };

    if args.fresh {
        pipeline.store().write().clear();
        log::info!("Cleared the index before ingesting");
    }

    let options = IngestOptions {
        batch_size: args.batch_size,
        encode_images: !args.no_images,
        persist_dir: Some(index_dir.to_path_buf()),
        ..IngestOptions::default()
    };
    let report = ingest(pipeline.store(), pipeline.encoder().as_ref(), entries, &options).await?;
    drop_stale_entries(pipeline).await;
    Ok(report)
}

/// Tombstone a product and persist.
pub async fn handle_remove(pipeline: &RankingPipeline, index_dir: &Path, id: &str) -> Result<()> {
    pipeline.store().write().remove(id)?;
    pipeline.store().read().persist(index_dir)?;
    drop_stale_entries(pipeline).await;
    Ok(())
}

/// Reclaim tombstoned slots and persist. Returns the number reclaimed.
pub async fn handle_compact(pipeline: &RankingPipeline, index_dir: &Path) -> Result<usize> {
    let reclaimed = pipeline.store().write().compact()?;
    if reclaimed > 0 {
        pipeline.store().read().persist(index_dir)?;
        drop_stale_entries(pipeline).await;
    }
    Ok(reclaimed)
}

/// Index and cache statistics.
pub async fn handle_stats(pipeline: &RankingPipeline) -> StatsReport {
    let index = pipeline.store().read().stats();
    StatsReport {
        index,
        cache: pipeline.cache().stats().await,
    }
}

/// Health of the index and the cache.
pub async fn handle_health(pipeline: &RankingPipeline) -> HealthReport {
    let stats = pipeline.store().read().stats();
    HealthReport {
        index: stats.health,
        products: stats.total_products,
        encoder: pipeline.encoder().name().to_string(),
        cache_backend: pipeline.cache().backend_name().to_string(),
        cache_available: pipeline.cache().is_available().await,
    }
}

async fn drop_stale_entries(pipeline: &RankingPipeline) {
    for namespace in [CacheNamespace::Search, CacheNamespace::Product] {
        pipeline.invalidate_cache(Some(namespace)).await;
    }
}
