//! The vector store: an ANN index plus the product metadata table.
//!
//! Slot `i` of the metadata table always describes index vector `i`.
//! Removal tombstones a slot and leaves the vector in place; only
//! [`VectorStore::rebuild`] and [`VectorStore::compact`] renumber slots.
//!
//! Two query paths are offered:
//!
//! - [`VectorStore::search`]: plain k-NN against the index vectors.
//! - [`VectorStore::hybrid_search`]: fetches a wide candidate pool with the
//!   weighted-average query, then rebuilds each candidate's comparison
//!   vector from its raw embeddings with the same alpha, so the ranking
//!   reflects what the caller asked for rather than how the product happened
//!   to be indexed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use vitrine_core::vector::{cosine, normalized, to_unit_interval, weighted_sum};
use vitrine_core::{Error, Modality, ProductRecord, Result};

use crate::ann::{AnnIndex, FlatIndex};
use crate::types::{
    Candidate, HealthStatus, HybridFallback, SearchFilters, VectorConfig, VectorStoreStats,
};

/// A store shared between request handlers and maintenance tasks.
///
/// Hold the read guard only for the duration of a retrieval, never across
/// an `.await`.
pub type SharedStore = Arc<RwLock<VectorStore>>;

/// ANN index plus product metadata.
pub struct VectorStore {
    pub(crate) config: VectorConfig,
    pub(crate) index: Box<dyn AnnIndex>,
    pub(crate) records: Vec<ProductRecord>,
    pub(crate) tombstones: BTreeSet<usize>,
    pub(crate) id_map: HashMap<String, usize>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("backend", &self.index.name())
            .field("dimension", &self.config.dimension)
            .field("slots", &self.records.len())
            .field("tombstones", &self.tombstones.len())
            .finish()
    }
}

impl VectorStore {
    /// Create an empty store backed by a [`FlatIndex`].
    pub fn new(config: VectorConfig) -> Self {
        let index = Box::new(FlatIndex::new(config.dimension));
        Self {
            config,
            index,
            records: Vec::new(),
            tombstones: BTreeSet::new(),
            id_map: HashMap::new(),
        }
    }

    /// Create an empty store over a caller-supplied index backend.
    ///
    /// The index must be empty and match the configured dimension.
    pub fn with_index(config: VectorConfig, index: Box<dyn AnnIndex>) -> Result<Self> {
        if index.dimension() != config.dimension {
            return Err(Error::dimension(config.dimension, index.dimension()));
        }
        if !index.is_empty() {
            return Err(Error::invalid_input(
                "vector store must be created over an empty index",
            ));
        }
        Ok(Self {
            config,
            index,
            records: Vec::new(),
            tombstones: BTreeSet::new(),
            id_map: HashMap::new(),
        })
    }

    /// Wrap in a [`SharedStore`].
    pub fn into_shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    /// Store configuration.
    pub fn config(&self) -> &VectorConfig {
        &self.config
    }

    /// Configured embedding dimension.
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Number of live products.
    pub fn len(&self) -> usize {
        self.records.len() - self.tombstones.len()
    }

    /// Whether there are no live products.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of tombstoned slots.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Whether a product id is live.
    pub fn contains(&self, id: &str) -> bool {
        self.id_map.contains_key(id)
    }

    /// Live records in slot order.
    pub fn records(&self) -> impl Iterator<Item = &ProductRecord> {
        self.records
            .iter()
            .enumerate()
            .filter(|(pos, _)| !self.tombstones.contains(pos))
            .map(|(_, record)| record)
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Insert one product under `vector`, returning its slot position.
    ///
    /// An id that is already live is replaced: the old slot is tombstoned.
    pub fn insert(&mut self, vector: &[f32], record: ProductRecord) -> Result<usize> {
        let (vector, record) = self.prepare(vector, record)?;
        self.push(vector, record)
    }

    /// Insert products in order, appending their vectors to the index in
    /// one [`AnnIndex::add_batch`] call.
    ///
    /// Every item is validated before anything is mutated, so a failing
    /// batch leaves the store untouched. A repeated id within the batch
    /// keeps its last occurrence.
    pub fn batch_insert(
        &mut self,
        vectors: Vec<Vec<f32>>,
        records: Vec<ProductRecord>,
    ) -> Result<usize> {
        if vectors.len() != records.len() {
            return Err(Error::invalid_input(format!(
                "batch has {} vectors but {} records",
                vectors.len(),
                records.len()
            )));
        }

        let prepared = vectors
            .iter()
            .zip(records)
            .map(|(vector, record)| self.prepare(vector, record))
            .collect::<Result<Vec<_>>>()?;

        let count = prepared.len();
        let (vectors, records): (Vec<Vec<f32>>, Vec<ProductRecord>) = prepared.into_iter().unzip();
        let first = self.index.len();
        self.index.add_batch(&vectors)?;
        for (offset, record) in records.into_iter().enumerate() {
            self.register(first + offset, record);
        }
        log::debug!("Inserted batch of {count} products");
        Ok(count)
    }

    /// Replace a product's metadata in place. The index vector is untouched.
    pub fn update(&mut self, id: &str, record: ProductRecord) -> Result<()> {
        if record.id != id {
            return Err(Error::invalid_input(format!(
                "record id '{}' does not match '{id}'",
                record.id
            )));
        }
        let position = self.position(id)?;
        self.records[position] = self.prepare_record(record)?;
        Ok(())
    }

    /// Tombstone a product. Its vector stays in the index until a rebuild.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let position = self.position(id)?;
        self.id_map.remove(id);
        self.tombstones.insert(position);
        log::debug!("Tombstoned product {id} at slot {position}");
        Ok(())
    }

    /// Replace the whole contents of the store.
    ///
    /// Validates every item first; on error the previous contents survive.
    pub fn rebuild(&mut self, vectors: Vec<Vec<f32>>, records: Vec<ProductRecord>) -> Result<usize> {
        if vectors.len() != records.len() {
            return Err(Error::invalid_input(format!(
                "rebuild has {} vectors but {} records",
                vectors.len(),
                records.len()
            )));
        }
        let prepared = vectors
            .iter()
            .zip(records)
            .map(|(vector, record)| self.prepare(vector, record))
            .collect::<Result<Vec<_>>>()?;

        self.clear();
        let count = prepared.len();
        for (vector, record) in prepared {
            self.push(vector, record)?;
        }
        log::info!("Rebuilt vector store with {count} products");
        Ok(count)
    }

    /// Rebuild from the live slots only, returning the number reclaimed.
    pub fn compact(&mut self) -> Result<usize> {
        let reclaimed = self.tombstones.len();
        if reclaimed == 0 {
            return Ok(0);
        }

        let mut vectors = Vec::with_capacity(self.len());
        let mut records = Vec::with_capacity(self.len());
        for (position, record) in self.records.iter().enumerate() {
            if self.tombstones.contains(&position) {
                continue;
            }
            let vector = self.index.vector(position).ok_or_else(|| {
                Error::invalid_data(format!("index has no vector for slot {position}"))
            })?;
            vectors.push(vector.to_vec());
            records.push(record.clone());
        }

        self.rebuild(vectors, records)?;
        log::info!("Compacted vector store, reclaimed {reclaimed} slots");
        Ok(reclaimed)
    }

    /// Drop every product.
    pub fn clear(&mut self) {
        self.index.clear();
        self.records.clear();
        self.tombstones.clear();
        self.id_map.clear();
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// The live record for `id`.
    pub fn get_by_id(&self, id: &str) -> Result<&ProductRecord> {
        let position = self.position(id)?;
        Ok(&self.records[position])
    }

    /// The index vector for `id`.
    pub fn get_embedding_by_id(&self, id: &str) -> Result<&[f32]> {
        let position = self.position(id)?;
        self.index
            .vector(position)
            .ok_or_else(|| Error::invalid_data(format!("index has no vector for slot {position}")))
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// k-NN over the index vectors.
    ///
    /// Scores are `(cos + 1) / 2`. Filters are applied after retrieval, so
    /// fewer than `k` results may come back.
    pub fn search(&self, query: &[f32], k: usize, filters: &SearchFilters) -> Result<Vec<Candidate>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimension(query)?;
        let query = normalized(query)?;

        let fetch = (k * self.config.overfetch_factor + self.tombstones.len()).min(self.records.len());
        let mut results = Vec::with_capacity(k);

        for neighbor in self.index.search(&query, fetch) {
            if self.tombstones.contains(&neighbor.position) {
                continue;
            }
            let record = &self.records[neighbor.position];
            if !filters.matches(record) {
                continue;
            }
            let score = to_unit_interval(neighbor.similarity);
            if !filters.accepts_score(score) {
                continue;
            }
            results.push(Candidate {
                record: record.clone(),
                score,
                position: neighbor.position,
                rescored: false,
            });
            if results.len() == k {
                break;
            }
        }

        Ok(results)
    }

    /// Alpha-consistent hybrid retrieval.
    ///
    /// `alpha` weights the image side. A modality with zero effective weight
    /// is ignored, so `alpha = 1` behaves exactly like an image-only query.
    pub fn hybrid_search(
        &self,
        text: Option<&[f32]>,
        image: Option<&[f32]>,
        alpha: f32,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<Candidate>> {
        if text.is_none() && image.is_none() {
            return Err(Error::invalid_input(
                "hybrid search needs a text or image embedding",
            ));
        }
        if !alpha.is_finite() {
            return Err(Error::invalid_input("alpha must be a finite number"));
        }
        for v in text.iter().chain(image.iter()) {
            self.check_dimension(v)?;
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let alpha = alpha.clamp(0.0, 1.0);
        let plan = HybridPlan::new(text, image, alpha)?;

        let pool = (k * self.config.hybrid_factor).max(self.config.hybrid_min_pool);
        let fetch = (pool + self.tombstones.len()).min(self.records.len());

        let mut results = Vec::new();
        let mut skipped = 0usize;

        for neighbor in self.index.search(&plan.query, fetch) {
            if self.tombstones.contains(&neighbor.position) {
                continue;
            }
            let record = &self.records[neighbor.position];
            if !filters.matches(record) {
                continue;
            }

            let (score, rescored) = match plan.comparison_vector(record)? {
                Some(comparison) => (to_unit_interval(cosine(&plan.query, &comparison)), true),
                None => match self.config.hybrid_fallback {
                    HybridFallback::IndexedVector => (to_unit_interval(neighbor.similarity), false),
                    HybridFallback::Skip => {
                        skipped += 1;
                        continue;
                    }
                },
            };

            if !filters.accepts_score(score) {
                continue;
            }
            results.push(Candidate {
                record: record.clone(),
                score,
                position: neighbor.position,
                rescored,
            });
        }

        if skipped > 0 {
            log::debug!("Hybrid search skipped {skipped} candidates without raw embeddings");
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        Ok(results)
    }

    /// Products nearest to an indexed product, excluding the product itself.
    pub fn similar_to(&self, id: &str, k: usize, filters: &SearchFilters) -> Result<Vec<Candidate>> {
        let query = self.get_embedding_by_id(id)?.to_vec();
        let mut results = self.search(&query, k + 1, filters)?;
        results.retain(|c| c.record.id != id);
        results.truncate(k);
        Ok(results)
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    /// Store statistics.
    pub fn stats(&self) -> VectorStoreStats {
        let slots = self.records.len();
        let tombstoned = self.tombstones.len();
        let health = if self.is_empty() {
            HealthStatus::Empty
        } else if tombstoned as f32 > slots as f32 * self.config.rebuild_threshold {
            HealthStatus::NeedsRebuild
        } else {
            HealthStatus::Healthy
        };

        VectorStoreStats {
            total_products: self.len(),
            indexed_vectors: self.index.len(),
            tombstoned,
            dimension: self.config.dimension,
            estimated_bytes: self.index.estimated_bytes(),
            backend: self.index.name().to_string(),
            health,
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn position(&self, id: &str) -> Result<usize> {
        self.id_map
            .get(id)
            .copied()
            .ok_or_else(|| Error::not_found(format!("product '{id}'")))
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.dimension {
            return Err(Error::dimension(self.config.dimension, vector.len()));
        }
        Ok(())
    }

    fn prepare(&self, vector: &[f32], record: ProductRecord) -> Result<(Vec<f32>, ProductRecord)> {
        self.check_dimension(vector)?;
        let vector = normalized(vector)?;
        Ok((vector, self.prepare_record(record)?))
    }

    /// Validate and normalise the raw embeddings a record carries.
    fn prepare_record(&self, mut record: ProductRecord) -> Result<ProductRecord> {
        if record.id.is_empty() {
            return Err(Error::invalid_input("product id must not be empty"));
        }
        for embedding in [&mut record.text_embedding, &mut record.image_embedding]
            .into_iter()
            .flatten()
        {
            self.check_dimension(embedding)?;
            *embedding = normalized(embedding)?;
        }
        Ok(record)
    }

    fn push(&mut self, vector: Vec<f32>, record: ProductRecord) -> Result<usize> {
        let position = self.index.add(&vector)?;
        self.register(position, record);
        Ok(position)
    }

    /// Record the product stored at the freshly appended `position`.
    fn register(&mut self, position: usize, record: ProductRecord) {
        if let Some(previous) = self.id_map.insert(record.id.clone(), position) {
            self.tombstones.insert(previous);
            log::debug!("Replaced product {} (slot {previous} -> {position})", record.id);
        }
        self.records.push(record);
    }
}

/// Query vector and required modalities for one `hybrid_search` call.
struct HybridPlan {
    query: Vec<f32>,
    alpha: f32,
    modalities: Vec<Modality>,
}

impl HybridPlan {
    fn new(text: Option<&[f32]>, image: Option<&[f32]>, alpha: f32) -> Result<Self> {
        let (query, modalities) = match (image, text) {
            (Some(image), Some(_)) if alpha >= 1.0 => (normalized(image)?, vec![Modality::Image]),
            (Some(_), Some(text)) if alpha <= 0.0 => (normalized(text)?, vec![Modality::Text]),
            (Some(image), Some(text)) => {
                let blended = weighted_sum(&normalized(image)?, &normalized(text)?, alpha);
                (normalized(&blended)?, vec![Modality::Image, Modality::Text])
            }
            (Some(image), None) => (normalized(image)?, vec![Modality::Image]),
            (None, Some(text)) => (normalized(text)?, vec![Modality::Text]),
            (None, None) => {
                return Err(Error::invalid_input(
                    "hybrid search needs a text or image embedding",
                ));
            }
        };

        let alpha = match modalities.as_slice() {
            [Modality::Image] => 1.0,
            [Modality::Text] => 0.0,
            _ => alpha,
        };

        Ok(Self {
            query,
            alpha,
            modalities,
        })
    }

    /// The candidate's vector rebuilt with this query's alpha, or `None`
    /// when the record lacks a raw embedding the query needs.
    fn comparison_vector(&self, record: &ProductRecord) -> Result<Option<Vec<f32>>> {
        match self.modalities.as_slice() {
            [modality] => Ok(record.embedding(*modality).map(<[f32]>::to_vec)),
            _ => {
                let (Some(image), Some(text)) = (
                    record.embedding(Modality::Image),
                    record.embedding(Modality::Text),
                ) else {
                    return Ok(None);
                };
                let blended = weighted_sum(image, text, self.alpha);
                // Opposed embeddings can cancel out; fall back like a missing one.
                Ok(normalized(&blended).ok())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
