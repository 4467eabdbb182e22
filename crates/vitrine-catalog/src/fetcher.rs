//! Product sources.
//!
//! A [`ProductFetcher`] answers a free-text query with normalised
//! [`ProductRecord`]s. Sources are independent and unreliable, so
//! [`fetch_all`] queries them concurrently and a failing or slow source
//! simply contributes nothing.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use vitrine_core::{ImageData, ProductRecord, Result};

/// Default per-source time budget.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A product source.
#[async_trait]
pub trait ProductFetcher: Send + Sync {
    /// Source name, also stored as [`ProductRecord::source`].
    fn name(&self) -> &str;

    /// Up to `max_results` products matching `query`.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ProductRecord>>;

    /// Primary image bytes for a product this source returned.
    ///
    /// Sources without image access return `Ok(None)`.
    async fn fetch_image(&self, _product: &ProductRecord) -> Result<Option<ImageData>> {
        Ok(None)
    }
}

/// A product plus its primary image, ready for ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// The product.
    pub record: ProductRecord,

    /// Primary image, when it could be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageData>,
}

impl CatalogEntry {
    /// Entry without an image.
    pub fn new(record: ProductRecord) -> Self {
        Self {
            record,
            image: None,
        }
    }

    /// Attach the primary image.
    pub fn with_image(mut self, image: ImageData) -> Self {
        self.image = Some(image);
        self
    }
}

/// Query every fetcher concurrently and merge the results.
///
/// Each source gets `timeout`; errors and timeouts are logged and the source
/// contributes zero products. Products are kept in fetcher order and a
/// repeated id keeps its first occurrence.
pub async fn fetch_all(
    fetchers: &[Arc<dyn ProductFetcher>],
    query: &str,
    max_results_per_source: usize,
    timeout: Duration,
) -> Vec<ProductRecord> {
    let tasks = fetchers.iter().map(|fetcher| async move {
        let outcome =
            tokio::time::timeout(timeout, fetcher.search(query, max_results_per_source)).await;
        match outcome {
            Ok(Ok(products)) => {
                log::debug!("{} returned {} products", fetcher.name(), products.len());
                products
            }
            Ok(Err(e)) => {
                log::error!("Fetcher {} failed: {e}", fetcher.name());
                Vec::new()
            }
            Err(_) => {
                log::error!(
                    "Fetcher {} timed out after {}ms",
                    fetcher.name(),
                    timeout.as_millis()
                );
                Vec::new()
            }
        }
    });

    let mut seen = HashSet::new();
    let products: Vec<ProductRecord> = join_all(tasks)
        .await
        .into_iter()
        .flatten()
        .filter(|p| seen.insert(p.id.clone()))
        .collect();

    log::info!(
        "Fetched {} products for '{query}' from {} sources",
        products.len(),
        fetchers.len()
    );
    products
}

/// Like [`fetch_all`], restricted to the named sources.
pub async fn fetch_from(
    fetchers: &[Arc<dyn ProductFetcher>],
    sources: &[&str],
    query: &str,
    max_results_per_source: usize,
    timeout: Duration,
) -> Vec<ProductRecord> {
    let selected: Vec<Arc<dyn ProductFetcher>> = fetchers
        .iter()
        .filter(|f| sources.contains(&f.name()))
        .cloned()
        .collect();
    fetch_all(&selected, query, max_results_per_source, timeout).await
}

/// Fetch primary images for products of one source.
///
/// Image failures are logged and leave the entry without an image.
pub async fn with_images(
    fetcher: &dyn ProductFetcher,
    products: Vec<ProductRecord>,
) -> Vec<CatalogEntry> {
    let tasks = products.into_iter().map(|record| async move {
        match fetcher.fetch_image(&record).await {
            Ok(Some(image)) => CatalogEntry::new(record).with_image(image),
            Ok(None) => CatalogEntry::new(record),
            Err(e) => {
                log::warn!("Could not fetch image for {}: {e}", record.id);
                CatalogEntry::new(record)
            }
        }
    });
    join_all(tasks).await
}
