//! Approximate-nearest-neighbour index contract.
//!
//! The store only needs a handful of operations from an index: append
//! vectors, query the `k` most similar positions, read a vector back, and
//! round-trip through bytes. [`FlatIndex`] satisfies the contract with an
//! exact inner-product scan, which is also what the tests rely on.

use rkyv::{Archive, Deserialize, Serialize};
use vitrine_core::{Error, Result};

/// A neighbour returned by an index query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Slot position in the index.
    pub position: usize,
    /// Inner product with the query (cosine for unit vectors).
    pub similarity: f32,
}

/// Contract the vector store requires from an index backend.
///
/// Positions are dense and assigned in insertion order; nothing short of
/// `clear` renumbers them.
pub trait AnnIndex: Send + Sync {
    /// Backend name for diagnostics and the metadata sidecar.
    fn name(&self) -> &str;

    /// Vector dimension.
    fn dimension(&self) -> usize;

    /// Number of vectors held.
    fn len(&self) -> usize;

    /// Whether the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a vector, returning its position.
    fn add(&mut self, vector: &[f32]) -> Result<usize>;

    /// Append vectors in order.
    ///
    /// Default implementation calls `add` for each vector. Backends with a
    /// native bulk path should override this.
    fn add_batch(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for vector in vectors {
            self.add(vector)?;
        }
        Ok(())
    }

    /// Up to `k` neighbours, most similar first.
    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor>;

    /// The vector stored at `position`.
    fn vector(&self, position: usize) -> Option<&[f32]>;

    /// Drop every vector.
    fn clear(&mut self);

    /// Serialize the index.
    fn to_bytes(&self) -> Result<Vec<u8>>;

    /// Replace the index contents with previously serialized bytes.
    fn restore(&mut self, bytes: &[u8]) -> Result<()>;

    /// Approximate memory footprint in bytes.
    fn estimated_bytes(&self) -> usize {
        self.len() * self.dimension() * std::mem::size_of::<f32>()
    }
}

// ============================================================================
// FlatIndex
// ============================================================================

#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq)]
struct FlatState {
    dimension: u32,
    data: Vec<f32>,
}

/// Exact inner-product index over a contiguous buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Deserialize an index written by [`AnnIndex::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // rkyv validates alignment, so copy into an aligned buffer first.
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);

        let state = rkyv::from_bytes::<FlatState, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::invalid_data(format!("corrupt flat index: {e}")))?;

        let dimension = state.dimension as usize;
        if dimension == 0 || state.data.len() % dimension != 0 {
            return Err(Error::invalid_data(format!(
                "flat index holds {} floats, not a multiple of dimension {dimension}",
                state.data.len()
            )));
        }

        Ok(Self {
            dimension,
            data: state.data,
        })
    }
}

impl AnnIndex for FlatIndex {
    fn name(&self) -> &str {
        "flat"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    fn add(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dimension {
            return Err(Error::dimension(self.dimension, vector.len()));
        }
        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    fn add_batch(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::dimension(self.dimension, bad.len()));
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 || query.len() != self.dimension || self.dimension == 0 {
            return Vec::new();
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                similarity: vitrine_core::vector::dot(query, v),
            })
            .collect();

        // Stable, so equal similarities keep insertion order.
        neighbors.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(k);
        neighbors
    }

    fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let state = FlatState {
            dimension: u32::try_from(self.dimension)
                .map_err(|_| Error::invalid_data("dimension does not fit in u32"))?,
            data: self.data.clone(),
        };
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&state)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        let restored = Self::from_bytes(bytes)?;
        if restored.dimension != self.dimension {
            return Err(Error::dimension(self.dimension, restored.dimension));
        }
        *self = restored;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
