//! Catalog ingestion into the vector store.
//!
//! For every entry the text embedding is computed from `"{title} {category}"`
//! and, when the entry carries an image, the image embedding and perceptual
//! hash as well. Embeddings are computed batch by batch without holding the
//! store lock; each batch is then inserted under one short write lock.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vitrine_core::vector::{normalized, weighted_sum};
use vitrine_core::{ProductRecord, Result};
use vitrine_rank::compute_image_hash;
use vitrine_vector::{EmbeddingEncoder, SharedStore};

use crate::fetcher::CatalogEntry;

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Entries encoded per batch.
    pub batch_size: usize,

    /// Encode entry images.
    pub encode_images: bool,

    /// Image share of the indexed vector for products with both embeddings.
    pub index_alpha: f32,

    /// Persist the store here once everything is inserted.
    pub persist_dir: Option<PathBuf>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            encode_images: true,
            index_alpha: 0.5,
            persist_dir: None,
        }
    }
}

/// What an ingestion run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Entries offered.
    pub received: usize,
    /// Entries inserted.
    pub indexed: usize,
    /// Entries dropped because their text could not be encoded.
    pub skipped: usize,
    /// Inserted entries that also carry an image embedding.
    pub with_image: usize,
    /// Whether the store was written to disk.
    pub persisted: bool,
}

/// Text the product's text embedding is computed from.
pub fn embedding_text(record: &ProductRecord) -> String {
    format!("{} {}", record.title, record.category)
        .trim()
        .to_string()
}

/// Encode and insert catalog entries.
///
/// Text encoding failures skip the affected entries; image failures only
/// drop the image embedding. Dimension mismatches abort the run because no
/// later batch could succeed either.
pub async fn ingest(
    store: &SharedStore,
    encoder: &dyn EmbeddingEncoder,
    entries: Vec<CatalogEntry>,
    options: &IngestOptions,
) -> Result<IngestReport> {
    let mut report = IngestReport {
        received: entries.len(),
        ..IngestReport::default()
    };
    let batch_size = options.batch_size.max(1);

    let mut remaining = entries.into_iter().peekable();
    while remaining.peek().is_some() {
        let batch: Vec<CatalogEntry> = remaining.by_ref().take(batch_size).collect();
        let (vectors, records) = encode_batch(encoder, batch, options, &mut report).await;
        if records.is_empty() {
            continue;
        }

        let count = store.write().batch_insert(vectors, records)?;
        report.indexed += count;
        log::info!("Indexed {}/{} products", report.indexed, report.received);
    }

    if let Some(dir) = &options.persist_dir {
        store.read().persist(dir)?;
        report.persisted = true;
    }
    Ok(report)
}

async fn encode_batch(
    encoder: &dyn EmbeddingEncoder,
    batch: Vec<CatalogEntry>,
    options: &IngestOptions,
    report: &mut IngestReport,
) -> (Vec<Vec<f32>>, Vec<ProductRecord>) {
    let texts: Vec<String> = batch.iter().map(|e| embedding_text(&e.record)).collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();

    let text_embeddings: Vec<Option<Vec<f32>>> = match encoder.encode_text_batch(&text_refs).await {
        Ok(embeddings) if embeddings.len() == batch.len() => embeddings.into_iter().map(Some).collect(),
        outcome => {
            if let Err(e) = outcome {
                log::warn!("Batch text encoding failed ({e}); encoding one by one");
            }
            let mut embeddings = Vec::with_capacity(batch.len());
            for (entry, text) in batch.iter().zip(&text_refs) {
                match encoder.encode_text(text).await {
                    Ok(embedding) => embeddings.push(Some(embedding)),
                    Err(e) => {
                        log::error!("Error indexing product {}: {e}", entry.record.id);
                        embeddings.push(None);
                    }
                }
            }
            embeddings
        }
    };

    let mut vectors = Vec::with_capacity(batch.len());
    let mut records = Vec::with_capacity(batch.len());
    for (entry, text_embedding) in batch.into_iter().zip(text_embeddings) {
        let Some(text_embedding) = text_embedding else {
            report.skipped += 1;
            continue;
        };
        let CatalogEntry { mut record, image } = entry;

        let mut image_embedding = None;
        if let Some(image) = image.filter(|i| !i.is_empty()) {
            if record.image_hash.is_none() {
                record.image_hash = compute_image_hash(&image).map(|h| h.to_hex());
            }
            if options.encode_images {
                match encoder.encode_image(&image).await {
                    Ok(embedding) => image_embedding = Some(embedding),
                    Err(e) => log::warn!("Image encoding failed for {}: {e}", record.id),
                }
            }
        }

        let vector = index_vector(&text_embedding, image_embedding.as_deref(), options.index_alpha);
        if image_embedding.is_some() {
            report.with_image += 1;
        }
        record.text_embedding = Some(text_embedding);
        record.image_embedding = image_embedding;
        vectors.push(vector);
        records.push(record);
    }
    (vectors, records)
}

/// The vector a product is indexed under.
fn index_vector(text: &[f32], image: Option<&[f32]>, alpha: f32) -> Vec<f32> {
    let Some(image) = image.filter(|i| i.len() == text.len()) else {
        return text.to_vec();
    };
    let (Ok(image), Ok(text_unit)) = (normalized(image), normalized(text)) else {
        return text.to_vec();
    };
    normalized(&weighted_sum(&image, &text_unit, alpha.clamp(0.0, 1.0))).unwrap_or_else(|_| text.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticFetcher;
    use crate::fetcher::with_images;
    use std::sync::Arc;
    use vitrine_core::{Error, ImageData};
    use vitrine_vector::{MockEncoder, SearchFilters, VectorConfig, VectorStore};

    fn shared(dimension: usize) -> SharedStore {
        VectorStore::new(VectorConfig::with_dimension(dimension)).into_shared()
    }

    fn text_only(count: usize) -> Vec<CatalogEntry> {
        SyntheticFetcher::new(count)
            .products()
            .iter()
            .cloned()
            .map(CatalogEntry::new)
            .collect()
    }

    #[test]
    fn test_embedding_text() {
        let record = ProductRecord::new("p", "Gold Watch").with_category("Accessories");
        assert_eq!(embedding_text(&record), "Gold Watch Accessories");
        assert_eq!(embedding_text(&ProductRecord::new("p", "Lamp")), "Lamp");
    }

    #[tokio::test]
    async fn test_ingest_text_only() {
        let store = shared(8);
        let encoder = MockEncoder::new(8);
        let options = IngestOptions {
            batch_size: 4,
            ..IngestOptions::default()
        };

        let report = ingest(&store, &encoder, text_only(10), &options).await.unwrap();
        assert_eq!(report.received, 10);
        assert_eq!(report.indexed, 10);
        assert_eq!(report.with_image, 0);
        assert!(!report.persisted);

        let store = store.read();
        assert_eq!(store.len(), 10);
        let first = store.get_by_id("SYN00000").unwrap();
        assert!(first.text_embedding.is_some());
        assert!(first.image_embedding.is_none());
        assert!(first.image_hash.is_none());
    }

    #[tokio::test]
    async fn test_ingest_with_images_sets_hash_and_embedding() {
        let store = shared(8);
        let encoder = MockEncoder::new(8);
        let fetcher = SyntheticFetcher::new(5);
        let entries = with_images(&fetcher, fetcher.products().to_vec()).await;

        let report = ingest(&store, &encoder, entries, &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.indexed, 5);
        assert_eq!(report.with_image, 5);
        assert_eq!(encoder.image_calls(), 5);

        let store = store.read();
        let record = store.get_by_id("SYN00002").unwrap();
        assert!(record.image_embedding.is_some());
        assert_eq!(record.image_hash.as_deref().map(str::len), Some(16));

        // Products with both embeddings can be found by either.
        let image = record.image_embedding.clone().unwrap();
        let hits = store
            .hybrid_search(None, Some(&image), 1.0, 1, &SearchFilters::none())
            .unwrap();
        assert_eq!(hits[0].record.id, "SYN00002");
    }

    #[tokio::test]
    async fn test_ingest_hash_without_image_encoding() {
        let store = shared(8);
        let encoder = MockEncoder::new(8);
        let fetcher = SyntheticFetcher::new(2);
        let entries = with_images(&fetcher, fetcher.products().to_vec()).await;
        let options = IngestOptions {
            encode_images: false,
            ..IngestOptions::default()
        };

        let report = ingest(&store, &encoder, entries, &options).await.unwrap();
        assert_eq!(report.with_image, 0);
        assert_eq!(encoder.image_calls(), 0);
        assert!(store.read().get_by_id("SYN00001").unwrap().image_hash.is_some());
    }

    #[tokio::test]
    async fn test_ingest_skips_entries_that_fail_to_encode() {
        let store = shared(8);
        // The batch call fails, then the first single call fails.
        let encoder = MockEncoder::new(8).failing(2);

        let report = ingest(&store, &encoder, text_only(3), &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped, 1);
        assert!(!store.read().contains("SYN00000"));
        assert!(store.read().contains("SYN00001"));
    }

    #[tokio::test]
    async fn test_ingest_dimension_mismatch_aborts() {
        let store = shared(4);
        let encoder = MockEncoder::new(8);
        let err = ingest(&store, &encoder, text_only(3), &IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
        assert!(store.read().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = shared(8);
        let encoder = Arc::new(MockEncoder::new(8));
        let options = IngestOptions {
            persist_dir: Some(dir.path().to_path_buf()),
            ..IngestOptions::default()
        };

        let report = ingest(&store, encoder.as_ref(), text_only(4), &options).await.unwrap();
        assert!(report.persisted);

        let loaded = VectorStore::try_load(dir.path(), VectorConfig::with_dimension(8)).unwrap();
        assert_eq!(loaded.len(), 4);
    }

    #[tokio::test]
    async fn test_ingest_empty_image_is_ignored() {
        let store = shared(8);
        let encoder = MockEncoder::new(8);
        let entry = CatalogEntry::new(ProductRecord::new("p", "Lamp")).with_image(ImageData::new(Vec::new()));
        let report = ingest(&store, &encoder, vec![entry], &IngestOptions::default())
            .await
            .unwrap();
        assert_eq!(report.indexed, 1);
        assert_eq!(encoder.image_calls(), 0);
    }

    #[test]
    fn test_index_vector_blends_both() {
        let text = [1.0, 0.0];
        let image = [0.0, 1.0];
        let v = index_vector(&text, Some(&image), 0.5);
        let expected = std::f32::consts::FRAC_1_SQRT_2;
        assert!((v[0] - expected).abs() < 1e-6);
        assert!((v[1] - expected).abs() < 1e-6);
        assert_eq!(index_vector(&text, None, 0.5), text.to_vec());
        assert_eq!(index_vector(&text, Some(&[1.0, 0.0, 0.0]), 0.5), text.to_vec());
    }
}
