//! Domain types shared across the Vitrine crates.
//!
//! [`ProductRecord`] is the single product representation: fetchers produce
//! it, the vector store owns it, and ranked results carry a copy of it with
//! the raw embeddings stripped.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Modality
// ============================================================================

/// Query/embedding modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Text-derived embedding.
    Text,
    /// Image-derived embedding.
    Image,
}

impl Modality {
    /// Lowercase name, used in cache namespaces and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Images
// ============================================================================

/// Raw (encoded) image bytes as received from a caller or a catalog.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    bytes: Vec<u8>,
}

impl ImageData {
    /// Wrap raw image bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether there are no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Stable content hash (Blake3, hex) of the raw bytes.
    ///
    /// Used for cache keys; not tolerant to re-encoding.
    pub fn content_hash(&self) -> String {
        blake3::hash(&self.bytes).to_hex().to_string()
    }
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("len", &self.bytes.len())
            .finish()
    }
}

// ============================================================================
// Products
// ============================================================================

/// A catalog product.
///
/// Identifiers are unique and stable across catalog refreshes. The raw
/// `text_embedding` / `image_embedding` are kept so the store can rebuild a
/// comparison vector for any query alpha.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Unique product identifier.
    pub id: String,

    /// Product title.
    pub title: String,

    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Price in the catalog currency.
    #[serde(default)]
    pub price: f64,

    /// Category name.
    #[serde(default)]
    pub category: String,

    /// Brand name.
    #[serde(default)]
    pub brand: String,

    /// Primary image reference (URL or path).
    #[serde(default)]
    pub image_url: String,

    /// Average rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,

    /// Number of reviews.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,

    /// Catalog source that produced this record.
    #[serde(default)]
    pub source: String,

    /// Purchase link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_url: Option<String>,

    /// Perceptual hash of the primary image (hex), if it could be computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,

    /// Raw unit-length text embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_embedding: Option<Vec<f32>>,

    /// Raw unit-length image embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_embedding: Option<Vec<f32>>,
}

impl ProductRecord {
    /// Create a record with the required fields; everything else defaults.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            price: 0.0,
            category: String::new(),
            brand: String::new(),
            image_url: String::new(),
            rating: None,
            review_count: None,
            source: String::new(),
            purchase_url: None,
            image_hash: None,
            text_embedding: None,
            image_embedding: None,
        }
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the price.
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    /// Set the brand.
    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = brand.into();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the perceptual image hash.
    pub fn with_image_hash(mut self, hash: impl Into<String>) -> Self {
        self.image_hash = Some(hash.into());
        self
    }

    /// Attach the raw text embedding.
    pub fn with_text_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.text_embedding = Some(embedding);
        self
    }

    /// Attach the raw image embedding.
    pub fn with_image_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.image_embedding = Some(embedding);
        self
    }

    /// Raw embedding for a modality, if stored.
    pub fn embedding(&self, modality: Modality) -> Option<&[f32]> {
        match modality {
            Modality::Text => self.text_embedding.as_deref(),
            Modality::Image => self.image_embedding.as_deref(),
        }
    }

    /// Copy without raw embeddings, for returning to callers.
    pub fn without_embeddings(&self) -> Self {
        Self {
            text_embedding: None,
            image_embedding: None,
            ..self.clone()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
