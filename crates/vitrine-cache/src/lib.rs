//! Fail-open caching for Vitrine.
//!
//! Query embeddings, ranked search responses, and product lookups are cached
//! under namespaced, hashed keys with per-namespace TTLs. The cache is an
//! optimisation only: [`CacheManager`] never surfaces an error, so an
//! unreachable or slow backend costs latency, not availability.
//!
//! # Backends
//!
//! - [`MemoryBackend`]: in-process TTL map (tests, single-process deployments)
//! - [`RedisBackend`]: Redis via a reconnecting connection manager
//! - disabled: [`CacheManager::disabled`] caches nothing
//!
//! # Example
//!
//! ```rust
//! # tokio_test::block_on(async {
//! use vitrine_cache::{CacheConfig, CacheManager, CacheNamespace};
//!
//! let cache = CacheManager::memory(CacheConfig::default());
//! cache.set_in(CacheNamespace::Product, "p-1", &"Red Dress").await;
//!
//! let title: Option<String> = cache.get_in(CacheNamespace::Product, "p-1").await;
//! assert_eq!(title.as_deref(), Some("Red Dress"));
//! # });
//! ```

pub mod backend;
pub mod keys;
pub mod manager;
pub mod memory;
pub mod redis_backend;
pub mod types;

pub use backend::CacheBackend;
pub use keys::{CacheNamespace, KEY_PREFIX, all_pattern, cache_key, namespace_pattern};
pub use manager::CacheManager;
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use types::{BackendKind, BackendStats, CacheConfig, CacheStats};
