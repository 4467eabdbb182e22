//! Error types for Vitrine operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Vitrine crates. Uses `thiserror` for derive macros.
//!
//! The taxonomy separates terminal request errors (`InvalidQuery`,
//! `DimensionMismatch`, `InvalidInput`) from retryable upstream failures
//! (`EncoderFailure`). Cache failures never appear here: the cache layer
//! absorbs them.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur in Vitrine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with the offending path.
    #[error("I/O error at {path}: {source}")]
    IoWithPath {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Product or artifact not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The search query was rejected before any work was done.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An operation received unusable input (e.g. no embeddings, zero vector).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown fusion method.
    #[error("Invalid fusion method: {0}")]
    InvalidMethod(String),

    /// Vector length does not match the configured dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension that was supplied.
        actual: usize,
    },

    /// The embedding encoder failed. Retryable.
    #[error("Encoder failure: {0}")]
    EncoderFailure(String),

    /// Generic operation failure.
    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create an invalid query error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an encoder failure.
    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::EncoderFailure(msg.into())
    }

    /// Create a generic operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a dimension mismatch error.
    pub fn dimension(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Wrap an I/O error with the path it occurred on.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether the caller may retry the operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EncoderFailure(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Vitrine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
