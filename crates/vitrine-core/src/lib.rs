//! Vitrine Core: shared types, errors, and vector utilities.
//!
//! This crate provides the foundational types used across all Vitrine
//! crates. It has no internal Vitrine dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error taxonomy and Result alias
//! - [`traits`]: Deployment configuration abstraction
//! - [`types`]: Products, images, modalities
//! - [`vector`]: Normalisation and similarity helpers

pub mod error;
pub mod traits;
pub mod types;
pub mod vector;

// Re-export key types at crate root for convenience
pub use error::{Error, Result};
pub use traits::ConfigProvider;
pub use types::{ImageData, Modality, ProductRecord};
