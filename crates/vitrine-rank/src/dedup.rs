//! Near-duplicate suppression by perceptual image hash.
//!
//! Catalogs aggregated from several sources often list the same product
//! photo more than once. A 64-bit difference hash (dHash) survives
//! re-encoding and resizing, so results whose primary images share a hash
//! collapse to the first (highest-ranked) one.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use vitrine_core::{Error, ImageData, Result};

const HASH_WIDTH: u32 = 9;
const HASH_HEIGHT: u32 = 8;

/// 64-bit difference hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ImageHash(u64);

impl ImageHash {
    /// Wrap raw hash bits.
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw hash bits.
    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Number of differing bits.
    pub fn distance(&self, other: &ImageHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// 16-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for ImageHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 16 {
            return Err(Error::invalid_data(format!("image hash '{s}' is not 16 hex digits")));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|e| Error::invalid_data(format!("image hash '{s}': {e}")))
    }
}

impl From<ImageHash> for String {
    fn from(hash: ImageHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for ImageHash {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Compute the difference hash of an encoded image.
///
/// The image is decoded, reduced to 9x8 grayscale, and each bit records
/// whether a pixel is brighter than its left neighbour. Bytes that do not
/// decode as an image yield `None`.
pub fn compute_image_hash(image: &ImageData) -> Option<ImageHash> {
    let decoded = match image::load_from_memory(image.bytes()) {
        Ok(decoded) => decoded,
        Err(e) => {
            log::debug!("Could not decode image for hashing: {e}");
            return None;
        }
    };
    let small = decoded
        .resize_exact(HASH_WIDTH, HASH_HEIGHT, FilterType::Triangle)
        .to_luma8();

    let mut bits = 0u64;
    for y in 0..HASH_HEIGHT {
        for x in 0..HASH_WIDTH - 1 {
            let left = small.get_pixel(x, y)[0];
            let right = small.get_pixel(x + 1, y)[0];
            bits = (bits << 1) | u64::from(right > left);
        }
    }
    Some(ImageHash(bits))
}

/// Drops items whose image hash was already seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deduplicator;

impl Deduplicator {
    /// Create a deduplicator.
    pub fn new() -> Self {
        Self
    }

    /// Keep the first item for each distinct hash, in order.
    ///
    /// Items without a hash always pass.
    pub fn deduplicate<T>(&self, items: Vec<T>, hashes: &[Option<ImageHash>]) -> Result<Vec<T>> {
        if items.len() != hashes.len() {
            return Err(Error::invalid_input(format!(
                "{} items but {} hashes",
                items.len(),
                hashes.len()
            )));
        }

        let mut seen = HashSet::new();
        let before = items.len();
        let kept: Vec<T> = items
            .into_iter()
            .zip(hashes)
            .filter(|(_, hash)| match hash {
                Some(hash) => seen.insert(*hash),
                None => true,
            })
            .map(|(item, _)| item)
            .collect();

        if kept.len() < before {
            log::debug!("Removed {} duplicate results", before - kept.len());
        }
        Ok(kept)
    }
}

// ============================================================================
// Tests
// ============================================================================
