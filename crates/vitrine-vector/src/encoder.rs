//! Embedding encoder trait and mock implementation.
//!
//! This module defines the `EmbeddingEncoder` trait that abstracts over the
//! multimodal model mapping text and images into one embedding space.
//!
//! # Encoders
//!
//! - `MockEncoder`: Deterministic vectors for testing, with overrides and
//!   failure injection
//! - `RetryingEncoder`: Exponential-backoff wrapper (see [`crate::retry`])
//! - `ClipEncoder`: Local CLIP via fastembed (requires `encoder-fastembed` feature)

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use vitrine_core::{Error, ImageData, Result};

/// Maximum characters passed to a text encoder.
pub const MAX_ENCODED_CHARS: usize = 250;

/// Trait for generating text and image embeddings in a shared space.
///
/// Implementations should return unit-length vectors of
/// [`dimension`](Self::dimension) elements. Failures are reported as
/// `Error::EncoderFailure` so callers can retry them.
#[async_trait]
pub trait EmbeddingEncoder: Send + Sync {
    /// Embed a text.
    async fn encode_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed an encoded image.
    async fn encode_image(&self, image: &ImageData) -> Result<Vec<f32>>;

    /// Embed a batch of texts.
    ///
    /// Default implementation calls `encode_text` for each text sequentially.
    async fn encode_text_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.encode_text(text).await?);
        }
        Ok(results)
    }

    /// Embed a batch of images.
    ///
    /// Default implementation calls `encode_image` for each image sequentially.
    async fn encode_image_batch(&self, images: &[ImageData]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(images.len());
        for image in images {
            results.push(self.encode_image(image).await?);
        }
        Ok(results)
    }

    /// The embedding dimension.
    fn dimension(&self) -> usize;

    /// The encoder name for diagnostics.
    fn name(&self) -> &str;
}

/// Shorten text to [`MAX_ENCODED_CHARS`] at a word boundary.
///
/// Text that already fits is returned unchanged. Otherwise the prefix is cut
/// back to the last space and `"..."` is appended.
pub fn truncate_for_encoding(text: &str) -> String {
    if text.chars().count() <= MAX_ENCODED_CHARS {
        return text.to_string();
    }
    let prefix: String = text.chars().take(MAX_ENCODED_CHARS).collect();
    let cut = match prefix.rfind(' ') {
        Some(idx) => &prefix[..idx],
        None => prefix.as_str(),
    };
    format!("{cut}...")
}

// ============================================================================
// MockEncoder
// ============================================================================

/// A mock encoder for testing.
///
/// Texts and images map to deterministic unit vectors derived from their
/// bytes. Specific inputs can be pinned to chosen vectors, and the encoder
/// can be told to fail its next calls.
pub struct MockEncoder {
    dimension: usize,
    text_overrides: HashMap<String, Vec<f32>>,
    image_overrides: HashMap<Vec<u8>, Vec<f32>>,
    failures_left: AtomicUsize,
    text_calls: AtomicUsize,
    image_calls: AtomicUsize,
}

impl MockEncoder {
    /// Create a mock encoder with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            text_overrides: HashMap::new(),
            image_overrides: HashMap::new(),
            failures_left: AtomicUsize::new(0),
            text_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
        }
    }

    /// Return `embedding` whenever `text` is encoded.
    pub fn with_text(mut self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.text_overrides.insert(text.into(), embedding);
        self
    }

    /// Return `embedding` whenever an image with these bytes is encoded.
    pub fn with_image(mut self, bytes: impl Into<Vec<u8>>, embedding: Vec<f32>) -> Self {
        self.image_overrides.insert(bytes.into(), embedding);
        self
    }

    /// Fail the next `count` encode calls with `EncoderFailure`.
    pub fn failing(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    /// Number of `encode_text` calls so far, failed ones included.
    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    /// Number of `encode_image` calls so far, failed ones included.
    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    fn maybe_fail(&self) -> Result<()> {
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::encoder("mock encoder failure"));
        }
        Ok(())
    }

    /// Generate a deterministic embedding from bytes.
    fn deterministic_embedding(&self, bytes: &[u8], salt: u8) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for (i, val) in embedding.iter_mut().enumerate() {
            let byte_val = if bytes.is_empty() {
                salt
            } else {
                bytes[i % bytes.len()] ^ salt
            };
            *val = ((byte_val as f32 + i as f32) % 256.0) / 256.0 + 1e-3;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingEncoder for MockEncoder {
    async fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        if let Some(embedding) = self.text_overrides.get(text) {
            return Ok(embedding.clone());
        }
        Ok(self.deterministic_embedding(text.as_bytes(), 0x00))
    }

    async fn encode_image(&self, image: &ImageData) -> Result<Vec<f32>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;
        if let Some(embedding) = self.image_overrides.get(image.bytes()) {
            return Ok(embedding.clone());
        }
        Ok(self.deterministic_embedding(image.bytes(), 0x5a))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl std::fmt::Debug for MockEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEncoder")
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
