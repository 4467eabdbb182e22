//! CLIP encoder backed by fastembed.
//!
//! Uses the ViT-B/32 text and vision towers, which share a 512-dimensional
//! embedding space. Both models are loaded once and reused.
//!
//! # Thread Safety
//!
//! The fastembed models need exclusive access per call, so each is wrapped
//! in `Arc<Mutex<>>` and invoked from `tokio::task::spawn_blocking`.
//!
//! # Feature Gate
//!
//! This module requires the `encoder-fastembed` feature.

use crate::encoder::{EmbeddingEncoder, truncate_for_encoding};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use vitrine_core::vector::normalized;
use vitrine_core::{Error, ImageData, Result};

/// Name reported by [`ClipEncoder`].
pub const CLIP_MODEL_NAME: &str = "clip-vit-b-32";

/// Local CLIP ViT-B/32 encoder.
pub struct ClipEncoder {
    text: Arc<Mutex<fastembed::TextEmbedding>>,
    vision: Arc<Mutex<fastembed::ImageEmbedding>>,
    dimension: usize,
}

impl ClipEncoder {
    /// Load both CLIP towers, downloading them into `cache_path` if needed.
    pub fn new(cache_path: Option<&str>) -> Result<Self> {
        let mut text_init = fastembed::InitOptions::new(fastembed::EmbeddingModel::ClipVitB32);
        let mut image_init =
            fastembed::ImageInitOptions::new(fastembed::ImageEmbeddingModel::ClipVitB32);
        if let Some(path) = cache_path {
            text_init = text_init.with_cache_dir(std::path::PathBuf::from(path));
            image_init = image_init.with_cache_dir(std::path::PathBuf::from(path));
        }

        let mut text = fastembed::TextEmbedding::try_new(text_init)
            .map_err(|e| Error::encoder(format!("Failed to initialize CLIP text model: {e}")))?;
        let vision = fastembed::ImageEmbedding::try_new(image_init)
            .map_err(|e| Error::encoder(format!("Failed to initialize CLIP vision model: {e}")))?;

        // Detect dimension from a sample embedding
        let sample = text
            .embed(vec!["dimension sample"], None)
            .map_err(|e| Error::encoder(format!("Failed to detect embedding dimension: {e}")))?;
        let dimension = sample
            .first()
            .map(|v| v.len())
            .ok_or_else(|| Error::encoder("Empty sample embedding"))?;

        log::info!("Loaded {CLIP_MODEL_NAME} encoder ({dimension} dimensions)");

        Ok(Self {
            text: Arc::new(Mutex::new(text)),
            vision: Arc::new(Mutex::new(vision)),
            dimension,
        })
    }

    async fn run_text(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = self.text.clone();
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::encoder(format!("Mutex poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::encoder(format!("Text embedding failed: {e}")))
        })
        .await
        .map_err(|e| Error::encoder(format!("spawn_blocking failed: {e}")))??;

        embeddings.iter().map(|v| normalized(v)).collect()
    }

    async fn run_images(&self, images: Vec<Vec<u8>>) -> Result<Vec<Vec<f32>>> {
        let model = self.vision.clone();
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::encoder(format!("Mutex poisoned: {e}")))?;
            let refs: Vec<&[u8]> = images.iter().map(Vec::as_slice).collect();
            model
                .embed_bytes(&refs, None)
                .map_err(|e| Error::encoder(format!("Image embedding failed: {e}")))
        })
        .await
        .map_err(|e| Error::encoder(format!("spawn_blocking failed: {e}")))??;

        embeddings.iter().map(|v| normalized(v)).collect()
    }
}

#[async_trait]
impl EmbeddingEncoder for ClipEncoder {
    async fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
        self.run_text(vec![truncate_for_encoding(text)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::encoder("No embedding returned"))
    }

    async fn encode_image(&self, image: &ImageData) -> Result<Vec<f32>> {
        if image.is_empty() {
            return Err(Error::invalid_input("image has no bytes"));
        }
        self.run_images(vec![image.bytes().to_vec()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::encoder("No embedding returned"))
    }

    async fn encode_text_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let texts = texts.iter().map(|t| truncate_for_encoding(t)).collect();
        self.run_text(texts).await
    }

    async fn encode_image_batch(&self, images: &[ImageData]) -> Result<Vec<Vec<f32>>> {
        let images = images.iter().map(|i| i.bytes().to_vec()).collect();
        self.run_images(images).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        CLIP_MODEL_NAME
    }
}

impl std::fmt::Debug for ClipEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipEncoder")
            .field("model", &CLIP_MODEL_NAME)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
