//! Catalog side of Vitrine: where products come from and how they get into
//! the vector store.
//!
//! - [`ProductFetcher`] is the seam for product sources; [`fetch_all`]
//!   queries several sources concurrently and tolerates failing ones.
//! - [`normalize_product`] and [`load_catalog_file`] turn loosely-typed JSON
//!   into [`ProductRecord`](vitrine_core::ProductRecord)s.
//! - [`SyntheticFetcher`] generates a deterministic catalog with images.
//! - [`ingest`] encodes products and batch-inserts them into a shared store.

pub mod fetcher;
pub mod ingest;
pub mod normalize;
pub mod synthetic;

pub use fetcher::{
    CatalogEntry, DEFAULT_FETCH_TIMEOUT, ProductFetcher, fetch_all, fetch_from, with_images,
};
pub use ingest::{IngestOptions, IngestReport, embedding_text, ingest};
pub use normalize::{load_catalog_file, normalize_product};
pub use synthetic::{SYNTHETIC_SOURCE, SyntheticFetcher};
