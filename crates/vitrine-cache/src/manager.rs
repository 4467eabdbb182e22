//! Fail-open cache manager.
//!
//! [`CacheManager`] is the only cache entry point the rest of Vitrine uses.
//! It never returns an error: an unreachable backend, a call that exceeds
//! the configured timeout, or a value that does not (de)serialize all
//! degrade to `false`, `None`, or `0` with a log line. Callers treat every
//! outcome as "maybe cached" and carry on.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use vitrine_core::{Modality, Result};

use crate::backend::CacheBackend;
use crate::keys::{CacheNamespace, cache_key, namespace_pattern};
use crate::memory::MemoryBackend;
use crate::redis_backend::RedisBackend;
use crate::types::{BackendKind, CacheConfig, CacheStats};

/// Cheaply cloneable cache handle.
#[derive(Clone)]
pub struct CacheManager {
    backend: Option<Arc<dyn CacheBackend>>,
    config: CacheConfig,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backend", &self.backend_name())
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}

impl CacheManager {
    /// Manager over an explicit backend.
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self {
            backend: Some(backend),
            config,
        }
    }

    /// Manager over a fresh [`MemoryBackend`].
    pub fn memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    /// Manager that caches nothing.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            config: CacheConfig {
                backend: BackendKind::Disabled,
                ..CacheConfig::default()
            },
        }
    }

    /// Build the manager described by `config`.
    ///
    /// A Redis server that cannot be reached within the timeout leaves the
    /// manager disabled; search keeps working uncached.
    pub async fn from_config(config: CacheConfig) -> Self {
        match config.backend {
            BackendKind::Memory => Self::memory(config),
            BackendKind::Disabled => Self {
                backend: None,
                config,
            },
            BackendKind::Redis => {
                // Connecting includes a handshake, so allow a few call timeouts.
                let budget = config.timeout() * 8;
                match tokio::time::timeout(budget, RedisBackend::connect(&config.redis_url)).await
                {
                    Ok(Ok(backend)) => Self::new(Arc::new(backend), config),
                    Ok(Err(e)) => {
                        log::warn!("Redis unavailable, caching disabled: {e}");
                        Self {
                            backend: None,
                            config,
                        }
                    }
                    Err(_) => {
                        log::warn!(
                            "Redis connection timed out after {}ms, caching disabled",
                            budget.as_millis()
                        );
                        Self {
                            backend: None,
                            config,
                        }
                    }
                }
            }
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Backend name, or `"disabled"`.
    pub fn backend_name(&self) -> &str {
        self.backend.as_ref().map_or("disabled", |b| b.name())
    }

    /// Default TTL for a namespace.
    pub fn ttl_for(&self, namespace: CacheNamespace) -> Duration {
        self.config.ttl_for(namespace)
    }

    // ------------------------------------------------------------------------
    // Core operations
    // ------------------------------------------------------------------------

    /// Store `value` as JSON under `key`. Returns whether it was written.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> bool
    where
        T: Serialize + Sync + ?Sized,
    {
        let Some(backend) = &self.backend else {
            return false;
        };
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Cache value for {key} did not serialize: {e}");
                return false;
            }
        };
        self.bounded("set", key, backend.set(key, bytes, ttl))
            .await
            .is_some()
    }

    /// Fetch and decode the value under `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let backend = self.backend.as_ref()?;
        let bytes = self.bounded("get", key, backend.get(key)).await??;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Cached value for {key} did not deserialize: {e}");
                None
            }
        }
    }

    /// Remove every key matching a glob. Returns the number removed.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let Some(backend) = &self.backend else {
            return 0;
        };
        let removed = self
            .bounded("invalidate", pattern, backend.delete_matching(pattern))
            .await
            .unwrap_or(0);
        log::info!("Invalidated {removed} cache keys matching {pattern}");
        removed
    }

    /// Remove every key in a namespace.
    pub async fn invalidate_namespace(&self, namespace: CacheNamespace) -> usize {
        self.invalidate(&namespace_pattern(namespace)).await
    }

    /// Whether the backend answers a ping within the timeout.
    pub async fn is_available(&self) -> bool {
        match &self.backend {
            Some(backend) => self.bounded("ping", "-", backend.ping()).await.is_some(),
            None => false,
        }
    }

    /// Key count and hit statistics.
    pub async fn stats(&self) -> CacheStats {
        let Some(backend) = &self.backend else {
            return CacheStats::unavailable("disabled");
        };
        match self.bounded("stats", "-", backend.stats()).await {
            Some(raw) => CacheStats::from_backend(backend.name(), raw),
            None => CacheStats::unavailable(backend.name()),
        }
    }

    // ------------------------------------------------------------------------
    // Namespaced helpers
    // ------------------------------------------------------------------------

    /// Fetch the value cached for `material` in `namespace`.
    pub async fn get_in<T: DeserializeOwned>(
        &self,
        namespace: CacheNamespace,
        material: impl AsRef<[u8]>,
    ) -> Option<T> {
        let key = cache_key(namespace, material);
        self.get(&key).await
    }

    /// Cache `value` for `material` in `namespace` with the namespace TTL.
    pub async fn set_in<T>(
        &self,
        namespace: CacheNamespace,
        material: impl AsRef<[u8]>,
        value: &T,
    ) -> bool
    where
        T: Serialize + Sync + ?Sized,
    {
        let key = cache_key(namespace, material);
        self.set(&key, value, self.ttl_for(namespace)).await
    }

    /// Cached query embedding for a modality.
    ///
    /// `material` is the preprocessed text or the raw image bytes.
    pub async fn get_embedding(&self, modality: Modality, material: &[u8]) -> Option<Vec<f32>> {
        let embedding: Vec<f32> = self
            .get_in(CacheNamespace::embedding(modality), material)
            .await?;
        if embedding.is_empty() {
            return None;
        }
        Some(embedding)
    }

    /// Cache a query embedding for a modality.
    pub async fn set_embedding(&self, modality: Modality, material: &[u8], embedding: &[f32]) -> bool {
        self.set_in(CacheNamespace::embedding(modality), material, embedding)
            .await
    }

    async fn bounded<T, F>(&self, op: &str, key: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.timeout(), call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                log::warn!("Cache {op} failed for {key}: {e}");
                None
            }
            Err(_) => {
                log::warn!(
                    "Cache {op} timed out after {}ms for {key}",
                    self.config.timeout_ms
                );
                None
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
