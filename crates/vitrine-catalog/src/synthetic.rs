//! Deterministic synthetic catalog.
//!
//! Products are generated from their position alone, so the same count
//! always yields the same titles, prices and images. Each product has a
//! small PNG swatch tinted with its colour and patterned from its id, which
//! gives every image a distinct perceptual hash.

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use vitrine_core::{Error, ImageData, ProductRecord, Result};

use crate::fetcher::ProductFetcher;

/// Source name of synthetic products.
pub const SYNTHETIC_SOURCE: &str = "synthetic";

const CATEGORIES: [(&str, [&str; 4]); 5] = [
    ("Dresses", ["Summer Dress", "Evening Gown", "Maxi Dress", "Wrap Dress"]),
    ("Tops", ["Cotton T-Shirt", "Silk Blouse", "Linen Shirt", "Knit Sweater"]),
    ("Bottoms", ["Denim Jeans", "Chino Pants", "Pleated Skirt", "Cargo Shorts"]),
    ("Shoes", ["Canvas Sneakers", "Leather Boots", "Running Shoes", "Suede Loafers"]),
    ("Accessories", ["Leather Bag", "Gold Watch", "Silver Necklace", "Aviator Sunglasses"]),
];

const COLORS: [(&str, [u8; 3]); 8] = [
    ("Red", [200, 30, 40]),
    ("Blue", [30, 60, 200]),
    ("Green", [40, 160, 60]),
    ("Black", [20, 20, 20]),
    ("White", [240, 240, 240]),
    ("Yellow", [230, 210, 40]),
    ("Pink", [230, 120, 170]),
    ("Purple", [120, 50, 160]),
];

const STYLES: [&str; 6] = ["Classic", "Casual", "Elegant", "Modern", "Vintage", "Formal"];

const BRANDS: [&str; 5] = ["Nike", "Adidas", "Zara", "H&M", "Uniqlo"];

const SWATCH_SIZE: u32 = 64;
const SWATCH_CELLS: u32 = 8;

/// Generates a fixed fashion catalog.
#[derive(Debug, Clone)]
pub struct SyntheticFetcher {
    products: Vec<ProductRecord>,
}

impl SyntheticFetcher {
    /// Catalog of `count` products.
    pub fn new(count: usize) -> Self {
        Self {
            products: (0..count).map(synthetic_product).collect(),
        }
    }

    /// All products, in generation order.
    pub fn products(&self) -> &[ProductRecord] {
        &self.products
    }

    /// The swatch image for a generated product.
    pub fn swatch(&self, id: &str) -> Result<ImageData> {
        let position = self
            .products
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::not_found(format!("synthetic product {id}")))?;
        render_swatch(position)
    }
}

#[async_trait]
impl ProductFetcher for SyntheticFetcher {
    fn name(&self) -> &str {
        SYNTHETIC_SOURCE
    }

    /// Products whose title, description or category contains a query word
    /// longer than two characters. A query that matches nothing returns the
    /// head of the catalog.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ProductRecord>> {
        let words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.chars().count() > 2)
            .map(String::from)
            .collect();

        let matching: Vec<ProductRecord> = self
            .products
            .iter()
            .filter(|p| {
                let haystack = format!(
                    "{} {} {}",
                    p.title,
                    p.category,
                    p.description.as_deref().unwrap_or_default()
                )
                .to_lowercase();
                words.iter().any(|w| haystack.contains(w.as_str()))
            })
            .take(max_results)
            .cloned()
            .collect();

        if matching.is_empty() {
            return Ok(self.products.iter().take(max_results).cloned().collect());
        }
        Ok(matching)
    }

    async fn fetch_image(&self, product: &ProductRecord) -> Result<Option<ImageData>> {
        self.swatch(&product.id).map(Some)
    }
}

fn synthetic_product(i: usize) -> ProductRecord {
    let (category, items) = CATEGORIES[i % CATEGORIES.len()];
    let item = items[(i / CATEGORIES.len()) % items.len()];
    let (color, _) = COLORS[(i * 3) % COLORS.len()];
    let style = STYLES[(i / 2) % STYLES.len()];
    let brand = BRANDS[(i / 3) % BRANDS.len()];
    let id = format!("SYN{i:05}");

    let mut record = ProductRecord::new(id.clone(), format!("{style} {color} {item}"))
        .with_category(category)
        .with_brand(brand)
        .with_price(((29.99 + (i % 50) as f64 * 10.0) * 100.0).round() / 100.0)
        .with_description(format!(
            "{style} {} in {} by {brand}",
            item.to_lowercase(),
            color.to_lowercase()
        ));
    record.image_url = format!("synthetic://{id}.png");
    record.rating = Some(3.5 + (i % 15) as f32 / 10.0);
    record.review_count = Some(10 + (i % 100) as u32);
    record.source = SYNTHETIC_SOURCE.to_string();
    record
}

/// 64x64 PNG: the product colour, with per-cell brightness drawn from a
/// generator seeded by the product position.
fn render_swatch(position: usize) -> Result<ImageData> {
    let (_, base) = COLORS[(position * 3) % COLORS.len()];
    let cell = SWATCH_SIZE / SWATCH_CELLS;

    let mut state = (position as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
    let mut shades = [0f32; (SWATCH_CELLS * SWATCH_CELLS) as usize];
    for shade in &mut shades {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *shade = 0.25 + (state % 1000) as f32 / 1333.0;
    }

    let img = RgbImage::from_fn(SWATCH_SIZE, SWATCH_SIZE, |x, y| {
        let shade = shades[((y / cell) * SWATCH_CELLS + x / cell) as usize];
        Rgb(base.map(|c| (c as f32 * shade).min(255.0) as u8))
    });

    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| Error::operation(format!("could not encode swatch: {e}")))?;
    Ok(ImageData::new(bytes))
}
