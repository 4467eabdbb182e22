//! Cache key construction.
//!
//! Every key has the shape `vitrine:{namespace}:{blake3-hex}`. The hash
//! covers whatever material identifies the cached value (preprocessed text,
//! raw image bytes, or a serialized query shape), so keys stay short and
//! never contain user input verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use vitrine_core::Modality;

/// Prefix shared by every key this crate writes.
pub const KEY_PREFIX: &str = "vitrine";

/// Logical cache partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    /// Text query embeddings.
    TextEmbedding,
    /// Image query embeddings.
    ImageEmbedding,
    /// Ranked search responses.
    Search,
    /// Single product lookups.
    Product,
}

impl CacheNamespace {
    /// All namespaces.
    pub const ALL: [CacheNamespace; 4] = [
        Self::TextEmbedding,
        Self::ImageEmbedding,
        Self::Search,
        Self::Product,
    ];

    /// The namespace segment used inside keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextEmbedding => "embedding:text",
            Self::ImageEmbedding => "embedding:image",
            Self::Search => "search",
            Self::Product => "product",
        }
    }

    /// The embedding namespace for a modality.
    pub fn embedding(modality: Modality) -> Self {
        match modality {
            Modality::Text => Self::TextEmbedding,
            Modality::Image => Self::ImageEmbedding,
        }
    }

    /// Parse a namespace from its key segment or a short alias.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "embedding:text" | "text" | "text_embedding" => Some(Self::TextEmbedding),
            "embedding:image" | "image" | "image_embedding" => Some(Self::ImageEmbedding),
            "search" => Some(Self::Search),
            "product" => Some(Self::Product),
            _ => None,
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the key for `material` in `namespace`.
pub fn cache_key(namespace: CacheNamespace, material: impl AsRef<[u8]>) -> String {
    let digest = blake3::hash(material.as_ref()).to_hex();
    format!("{KEY_PREFIX}:{}:{digest}", namespace.as_str())
}

/// Glob matching every key in `namespace`.
pub fn namespace_pattern(namespace: CacheNamespace) -> String {
    format!("{KEY_PREFIX}:{}:*", namespace.as_str())
}

/// Glob matching every key this crate writes.
pub fn all_pattern() -> String {
    format!("{KEY_PREFIX}:*")
}
