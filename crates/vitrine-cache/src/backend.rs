//! Cache backend contract.
//!
//! Backends deal in raw bytes and report failures as errors. The
//! [`CacheManager`](crate::CacheManager) adds serialization, timeouts, and
//! the fail-open policy on top.

use async_trait::async_trait;
use std::time::Duration;
use vitrine_core::Result;

use crate::types::BackendStats;

/// A key/value store with per-entry expiry and glob invalidation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<()>;

    /// Fetch a live entry.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store an entry that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove every key matching a glob, returning how many were removed.
    async fn delete_matching(&self, pattern: &str) -> Result<usize>;

    /// Key count and hit/miss counters.
    async fn stats(&self) -> Result<BackendStats>;
}
